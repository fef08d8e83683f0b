use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Auth config error: {0}")]
    AuthConfig(String),

    #[error("Upstream generation error: {0}")]
    UpstreamGeneration(String),

    #[error("Upstream synthesis error: {0}")]
    UpstreamSynthesis(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Text sent to the client in an `error` event. Provider detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::AuthConfig(msg) => msg.clone(),
            Self::UpstreamGeneration(_) => "Failed to generate response".into(),
            Self::UpstreamSynthesis(_) => "Failed to synthesize audio".into(),
            Self::Channel(_) => "Connection error".into(),
            _ => "Internal server error".into(),
        }
    }

    /// Whether the error belongs to the caller (bad request) rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::AuthConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_detail_not_leaked() {
        let err = RelayError::UpstreamGeneration("HTTP 500: quota exceeded for key abc".into());
        assert_eq!(err.client_message(), "Failed to generate response");
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_client_errors() {
        assert!(RelayError::Validation("Prompt is required".into()).is_client_error());
        assert!(RelayError::AuthConfig("missing".into()).is_client_error());
        assert!(!RelayError::Channel("closed".into()).is_client_error());
        assert_eq!(
            RelayError::Validation("Prompt is required".into()).client_message(),
            "Prompt is required"
        );
    }
}
