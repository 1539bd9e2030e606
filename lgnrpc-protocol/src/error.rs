//! Protocol error taxonomy.
//!
//! The taxonomy is closed: callers of this crate only ever observe these
//! variants. [`ProtocolError::TooShortHeaderToParse`] is the single soft
//! variant, a "need more input" signal the frame accumulator swallows;
//! every other variant is a hard per-connection fault.

use thiserror::Error;

/// Errors raised while framing, ciphering or parsing LGNP messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not an error: more bytes are needed before the frame can be parsed.
    #[error("not enough bytes to parse a frame")]
    TooShortHeaderToParse,

    #[error("input is the literal error sentinel")]
    InvalidMessage,

    #[error("invalid magic bytes: expected \"LGNP\", got {0:?}")]
    InvalidMessageProtocol([u8; 4]),

    #[error("invalid message length: {0}")]
    InvalidMessageLength(usize),

    #[error("no NUL terminator found for URI, or URI is not ASCII")]
    URIParsingFailed,

    #[error("meta section flagged but not present")]
    MetaSectionNotFound,

    #[error("parsing failed: {0}")]
    ParsingFailed(String),

    #[error("compression is flagged but not supported")]
    CompressionFailed,

    #[error("decompression is flagged but not supported")]
    DecompressionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("encoded frame too large: {size} bytes (max {max})")]
    EncodingFailed { size: usize, max: usize },

    #[error("invalid salt length {0}: must be 6 to 12 bytes")]
    InvalidSalt(usize),

    #[error("invalid key length {0}: must be 16, 24 or 32 bytes")]
    InvalidKey(usize),
}

impl ProtocolError {
    /// Soft errors mean "keep buffering", never corruption.
    pub fn is_soft(&self) -> bool {
        matches!(self, ProtocolError::TooShortHeaderToParse)
    }

    /// Security failures are logged at elevated severity by transports.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            ProtocolError::SignatureVerificationFailed
                | ProtocolError::EncryptionFailed
                | ProtocolError::DecryptionFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_classification() {
        assert!(ProtocolError::TooShortHeaderToParse.is_soft());
        assert!(!ProtocolError::InvalidMessageLength(3).is_soft());
        assert!(!ProtocolError::SignatureVerificationFailed.is_soft());
    }

    #[test]
    fn test_security_classification() {
        assert!(ProtocolError::SignatureVerificationFailed.is_security());
        assert!(ProtocolError::DecryptionFailed.is_security());
        assert!(ProtocolError::EncryptionFailed.is_security());
        assert!(!ProtocolError::URIParsingFailed.is_security());
        assert!(!ProtocolError::TooShortHeaderToParse.is_security());
    }

    #[test]
    fn test_display_contains_context() {
        let err = ProtocolError::InvalidMessageProtocol(*b"HTTP");
        assert!(err.to_string().contains("LGNP"));

        let err = ProtocolError::EncodingFailed { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));

        let err = ProtocolError::InvalidSalt(3);
        assert!(err.to_string().contains('3'));
    }
}
