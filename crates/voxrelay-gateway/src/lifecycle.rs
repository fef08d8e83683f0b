//! Session creation and channel attachment.

use tracing::{info, warn};

use voxrelay_core::channel::SessionChannel;
use voxrelay_core::error::{RelayError, Result};
use voxrelay_core::protocol::ServerEvent;
use voxrelay_core::session::{self, SessionHandle};

use crate::state::GatewayState;

/// Create a session for `prompt` after checking the prompt and upstream credentials.
///
/// Nothing is registered when either check fails.
pub async fn start_conversation(state: &GatewayState, prompt: &str) -> Result<String> {
    if prompt.trim().is_empty() {
        return Err(RelayError::Validation("Prompt is required".into()));
    }

    if let Err(problems) = state.config.check_credentials() {
        warn!(problems = ?problems, "Credential check failed");
        return Err(RelayError::AuthConfig(format!(
            "API key invalid: {}",
            problems.join("; ")
        )));
    }

    let id = state.registry.create(prompt.to_string()).await;
    info!(session_id = %id, "Conversation started");
    Ok(id)
}

/// Bind a freshly upgraded channel to its session and greet the client.
///
/// Returns `None` if the session vanished between the upgrade check and now.
pub async fn attach(
    state: &GatewayState,
    session_id: &str,
    channel: SessionChannel,
) -> Option<SessionHandle> {
    let handle = state
        .registry
        .attach_channel(session_id, channel.clone())
        .await?;

    {
        let s = session::lock(&handle);
        if s.is_disconnected() {
            return None;
        }
        channel.send_event(ServerEvent::connected());
    }

    info!(session_id = %session_id, "Channel attached");
    Some(handle)
}
