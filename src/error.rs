//! Error types for external collaborator calls
//!
//! Collaborator errors never reach the caller of `resolve`. They are logged and
//! downgraded at the call site. Classification mirrors what a retrying caller
//! (the ingestion pipeline, the embeddings client) needs to know:
//! - Retryable: timeouts, transport failures, 429 and 5xx responses
//! - NonRetryable: other API statuses, malformed output, missing credentials

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Collaborator timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed collaborator output: {0}")]
    Malformed(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Timeout(_) | CollaboratorError::Http(_) => true,
            CollaboratorError::Api { status, .. } => *status == 429 || *status >= 500,
            CollaboratorError::Malformed(_) | CollaboratorError::Unavailable(_) => false,
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CollaboratorError::Timeout(Duration::ZERO);
        }
        if err.is_decode() {
            return CollaboratorError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) => CollaboratorError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => CollaboratorError::Http(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CollaboratorError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(CollaboratorError::Http("reset".into()).is_retryable());
        assert!(CollaboratorError::Api { status: 429, message: String::new() }.is_retryable());
        assert!(CollaboratorError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(!CollaboratorError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!CollaboratorError::Malformed("x".into()).is_retryable());
        assert!(!CollaboratorError::Unavailable("no key".into()).is_retryable());
    }
}
