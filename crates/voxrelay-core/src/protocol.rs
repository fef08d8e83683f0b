//! Conversation wire protocol.
//!
//! Control messages travel as JSON text frames tagged by `type`. Synthesized
//! audio travels as raw binary frames with no JSON envelope, so the frame kind
//! alone tells the client which is which.

use serde::{Deserialize, Serialize};

/// Content of the `connected` event sent as the first frame after upgrade.
pub const CONNECTED_MESSAGE: &str = "WebSocket connection established";

/// Client -> Server text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A finished utterance from the speech-to-text side.
    Transcript { content: String },

    /// Any other well-formed frame type. Ignored.
    #[serde(other)]
    Unknown,
}

/// Server -> Client text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Channel attached to its session.
    Connected { content: String },
    /// One streamed generation delta.
    Text { content: String },
    /// A failure the client should know about. The session stays usable.
    Error { content: String },
}

impl ServerEvent {
    pub fn connected() -> Self {
        Self::Connected {
            content: CONNECTED_MESSAGE.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }
}

/// `POST /start-conversation` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConversationRequest {
    #[serde(default)]
    pub prompt: String,
}

/// `POST /start-conversation` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationResponse {
    pub connection_id: String,
    pub message: String,
}

/// Error body returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
