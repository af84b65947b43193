use std::time::Duration;

/// Typed failure of a completion request or of the stream it returned.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl CompletionError {
    /// Worth retrying by the user without changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
                | Self::Timeout(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable text shown inline where the generated content would appear.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationFailed(_) => {
                "The AI service rejected the API key. Check that AI_API_KEY is valid and has not expired.".into()
            }
            Self::InvalidRequest(detail) => {
                format!("The AI service could not process the request ({detail}). Check AI_BASE_URL and the model name.")
            }
            Self::RateLimited { .. } => {
                "The AI service is rate limiting requests. Wait a moment and try again.".into()
            }
            Self::ServerError { status, .. } => {
                format!("The AI service returned an error (HTTP {status}). Try again shortly.")
            }
            Self::NetworkError(_) => {
                "Could not reach the AI service. Check the network connection and AI_BASE_URL.".into()
            }
            Self::StreamInterrupted(_) => {
                "The response was cut off before it finished. Try again.".into()
            }
            Self::Timeout(after) => {
                format!("The AI service stopped responding after {}s. Try again.", after.as_secs())
            }
            Self::Cancelled => "Generation was cancelled.".into(),
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}
