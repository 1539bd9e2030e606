//! Server error types.

use lgnrpc_protocol::ProtocolError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("required bitmask {required:#06x} not satisfied by frame bitmask {frame:#06x}")]
    RequiredBitmaskNotSatisfied { required: u16, frame: u16 },

    #[error("connection idle timeout")]
    Timeout,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Stable numeric code carried in structured error frames.
    pub fn error_code(&self) -> u16 {
        match self {
            ServerError::Protocol(e) if e.is_security() => 403,
            ServerError::Protocol(_) => 400,
            ServerError::RequiredBitmaskNotSatisfied { .. } => 412,
            ServerError::Timeout => 408,
            ServerError::ConnectionClosed => 499,
            ServerError::Io(_) | ServerError::ShuttingDown => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServerError::Protocol(ProtocolError::URIParsingFailed).error_code(),
            400
        );
        assert_eq!(
            ServerError::Protocol(ProtocolError::SignatureVerificationFailed).error_code(),
            403
        );
        assert_eq!(
            ServerError::RequiredBitmaskNotSatisfied {
                required: 0x20,
                frame: 0
            }
            .error_code(),
            412
        );
        assert_eq!(ServerError::Timeout.error_code(), 408);
        assert_eq!(ServerError::ShuttingDown.error_code(), 500);
    }
}
