//! Client error types.

use lgnrpc_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("a request is already outstanding on this client")]
    Busy,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("error response: {code} {message}")]
    ErrorResponse { code: u16, message: String },
}

impl ClientError {
    /// Returns whether retrying the request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout | ClientError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(!ClientError::Busy.is_retryable());
        assert!(!ClientError::ErrorResponse {
            code: 412,
            message: "nope".into()
        }
        .is_retryable());
        assert!(!ClientError::Protocol(ProtocolError::SignatureVerificationFailed).is_retryable());
    }
}
