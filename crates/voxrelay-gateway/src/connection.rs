//! WebSocket connection lifecycle: attach, read/write loops, teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voxrelay_core::channel::{OutboundFrame, SessionChannel, encode_event};
use voxrelay_core::error::RelayError;
use voxrelay_core::protocol::{ClientFrame, ServerEvent};
use voxrelay_core::session;

use crate::coordinator::{SessionEvent, StreamCoordinator};
use crate::heartbeat::HeartbeatMonitor;
use crate::lifecycle;
use crate::state::GatewayState;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Turn a decoded client text frame into the event the coordinator consumes.
///
/// `Err` carries the content of the error event to send back.
pub fn decode_client_frame(text: &str) -> Result<Option<SessionEvent>, &'static str> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Transcript { content }) => Ok(Some(SessionEvent::Transcript(content))),
        Ok(ClientFrame::Unknown) => Ok(None),
        Err(_) => Err("Invalid message"),
    }
}

/// Handle an upgraded WebSocket bound to `session_id`.
pub async fn handle_ws_connection(state: Arc<GatewayState>, session_id: String, ws: WebSocket) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (channel, mut outbound) = SessionChannel::new();

    // Writer task: sole owner of the socket's send half
    let writer_id = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let msg = match frame {
                OutboundFrame::Event(event) => match encode_event(&event) {
                    Some(json) => Message::Text(json.into()),
                    None => continue,
                },
                OutboundFrame::Audio(chunk) => Message::Binary(chunk),
                OutboundFrame::Ping => Message::Ping(Bytes::new()),
                OutboundFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(msg).await.is_err() {
                debug!(session_id = %writer_id, "Socket send failed, writer exiting");
                break;
            }
        }
    });

    let Some(handle) = lifecycle::attach(&state, &session_id, channel.clone()).await else {
        warn!(session_id = %session_id, "Session vanished before attach");
        channel.close();
        let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await;
        return;
    };

    let heartbeat = HeartbeatMonitor::new(
        session_id.clone(),
        handle.clone(),
        channel.clone(),
        state.settings.heartbeat_interval(),
    )
    .start();

    let (events_tx, events_rx) = mpsc::channel(state.settings.event_buffer.max(1));
    let coordinator =
        StreamCoordinator::new(&state, session_id.clone(), handle.clone(), channel.clone());
    let coordinator_task = tokio::spawn(coordinator.run(events_rx));

    let closed = channel.closed_token();
    let end = loop {
        let msg_result = tokio::select! {
            _ = closed.cancelled() => {
                debug!(session_id = %session_id, "Channel closed server-side");
                break SessionEvent::Closed;
            }
            msg = ws_rx.next() => match msg {
                Some(msg) => msg,
                None => break SessionEvent::Closed,
            },
        };

        session::lock(&handle).touch();

        match msg_result {
            Ok(Message::Text(text)) => match decode_client_frame(text.as_str()) {
                Ok(Some(event)) => {
                    if events_tx.send(event).await.is_err() {
                        break SessionEvent::Closed;
                    }
                }
                Ok(None) => debug!(session_id = %session_id, "Ignoring unknown frame type"),
                Err(reply) => {
                    warn!(session_id = %session_id, "Malformed client frame");
                    channel.send_event(ServerEvent::error(reply));
                }
            },
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "Client requested close");
                break SessionEvent::Closed;
            }
            Ok(_) => {
                // Ping/pong are answered by axum; binary frames carry nothing for us
            }
            Err(e) => break SessionEvent::ChannelError(RelayError::Channel(e.to_string())),
        }
    };

    // Teardown: stop generation, then evict unless a newer socket took over
    let _ = events_tx.send(end).await;
    drop(events_tx);
    let _ = coordinator_task.await;
    state.registry.remove_if_owned(&session_id, &channel).await;
    channel.close();
    heartbeat.abort();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await.is_err() {
        debug!(session_id = %session_id, "Writer did not drain in time");
    }
    info!(session_id = %session_id, "WebSocket connection closed");
}
