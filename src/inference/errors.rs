//! Provider error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. The engine does
//! not retry any of these; a provider error ends the turn.

use thiserror::Error;

/// Errors an [`LlmProvider`](super::provider::LlmProvider) can report.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Credentials were missing or rejected.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response could not be interpreted as text or tool calls.
    #[error("invalid provider response: {reason}")]
    InvalidResponse { reason: String },
}

impl ProviderError {
    /// Whether the failure happened before the provider produced any output.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProviderError::ConnectionFailed { .. } | ProviderError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_display() {
        let err = ProviderError::ConnectionFailed {
            endpoint: "http://localhost:11434".into(),
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection failed to http://localhost:11434: refused"
        );
        assert!(err.is_transport());
    }

    #[test]
    fn test_http_error_is_not_transport() {
        let err = ProviderError::HttpError {
            status: 500,
            body: "internal".into(),
        };
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "HTTP 500: internal");
    }
}
