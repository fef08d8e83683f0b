//! Terminal conversation client.

use anyhow::{Context, bail};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, warn};

use voxrelay_core::protocol::{
    ClientFrame, ErrorBody, ServerEvent, StartConversationRequest, StartConversationResponse,
};
use voxrelay_core::retry::RetryPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map the gateway's HTTP base URL to its conversation socket URL.
pub fn socket_url(base: &str, connection_id: &str) -> anyhow::Result<String> {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        bail!("Unsupported URL scheme: {base}");
    };
    Ok(format!("{ws_base}/ws?connectionId={connection_id}"))
}

async fn start_conversation(base: &str, prompt: &str) -> anyhow::Result<String> {
    let resp = reqwest::Client::new()
        .post(format!("{}/start-conversation", base.trim_end_matches('/')))
        .json(&StartConversationRequest {
            prompt: prompt.to_string(),
        })
        .send()
        .await
        .context("Gateway unreachable")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let reason = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());
        bail!("Gateway refused the conversation: {reason}");
    }

    let started: StartConversationResponse = resp.json().await?;
    info!(connection_id = %started.connection_id, "{}", started.message);
    Ok(started.connection_id)
}

async fn connect_with_retry(url: &str, policy: &RetryPolicy) -> anyhow::Result<WsStream> {
    let mut retry = policy.start();
    loop {
        retry.begin_attempt();
        match connect_async(url).await {
            Ok((ws, _)) => return Ok(ws),
            Err(e) => match retry.next_delay() {
                Some(delay) => {
                    warn!(attempt = retry.attempt(), error = %e, ?delay, "Connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(e).context(format!(
                        "Could not connect after {} attempts",
                        retry.attempt()
                    ));
                }
            },
        }
    }
}

/// Start a conversation and relay stdin lines as transcripts until EOF.
pub async fn run(base: &str, prompt: &str, policy: RetryPolicy) -> anyhow::Result<()> {
    let connection_id = start_conversation(base, prompt).await?;
    let ws = connect_with_retry(&socket_url(base, &connection_id)?, &policy).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut audio_bytes = 0usize;

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let frame = serde_json::to_string(&ClientFrame::Transcript { content: line })?;
                    ws_tx.send(Message::Text(frame.into())).await?;
                }
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(ServerEvent::Text { content }) => {
                        stdout.write_all(content.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Ok(ServerEvent::Error { content }) => eprintln!("\n[error] {content}"),
                    Ok(ServerEvent::Connected { content }) => eprintln!("[{content}]"),
                    Err(e) => warn!(%e, "Unrecognized server frame"),
                },
                Some(Ok(Message::Binary(chunk))) => audio_bytes += chunk.len(),
                Some(Ok(Message::Close(_))) | None => {
                    eprintln!("\n[connection closed by gateway]");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    eprintln!("\nReceived {audio_bytes} bytes of audio");
    Ok(())
}
