//! Error types for the LLM crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for model and embedding calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error.
    #[error("Network error: {0}")]
    Network(String),

    /// The call exceeded its configured ceiling.
    #[error("Model call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Configuration error (API key missing, unknown tier, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Returns true for failures caused by the transport rather than the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimit(_) | Self::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient() {
        assert!(LlmError::Network("reset".to_string()).is_transient());
        assert!(LlmError::Timeout(Duration::from_secs(3)).is_transient());
        assert!(LlmError::RateLimit("slow down".to_string()).is_transient());
        assert!(!LlmError::Config("bad config".to_string()).is_transient());
        assert!(!LlmError::Backend("server error".to_string()).is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = LlmError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Model call timed out after 1.5s");
    }
}
