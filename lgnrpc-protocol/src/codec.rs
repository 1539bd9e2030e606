//! Byte-exact encoder and decoder for LGNP frames.
//!
//! Frame layout (little-endian integers):
//!
//! ```text
//! +--------+--------+--------+---------+--------------------------------+
//! | HEAD   | SIZE   | ID     | BITMASK | [SIGN] URI NUL [MSZE META] BODY|
//! | "LGNP" | u32 LE | 16 B   | u16 LE  | variable                       |
//! +--------+--------+--------+---------+--------------------------------+
//! ```
//!
//! `SIZE` counts the whole frame including HEAD and SIZE. Everything from
//! SIGN onward may be wrapped in AES encryption when the `encrypted` flag
//! is set; everything from URI onward (after decryption) plus the message
//! id is the signable material.

use bytes::{BufMut, BytesMut};
use uuid::Uuid;

use crate::cryptor::Cryptor;
use crate::error::ProtocolError;
use crate::message::{ControlBitmask, Message};
use bytes::Bytes;
use std::sync::Arc;

/// Magic bytes identifying LGNP frames.
pub const MAGIC: [u8; 4] = *b"LGNP";

/// Length of HEAD + SIZE, the prefix needed to learn a frame's length.
pub const MESSAGE_HEADER_LENGTH: usize = 8;

/// Theoretical minimum frame: HEAD + SIZE + ID + BITMASK + 1-byte URI + NUL.
pub const MINIMUM_MESSAGE_LENGTH: usize = MESSAGE_HEADER_LENGTH + 16 + 2 + 1 + 1;

/// Literal sentinel some legacy peers emit instead of a frame.
pub const ERROR_SENTINEL: &[u8] = b"error";

/// Parses the total frame length from a buffered prefix.
///
/// Needs [`MESSAGE_HEADER_LENGTH`] bytes; shorter input yields the soft
/// [`ProtocolError::TooShortHeaderToParse`] so callers keep buffering.
pub fn parse_frame_length(input: &[u8]) -> Result<usize, ProtocolError> {
    if input.len() < MESSAGE_HEADER_LENGTH {
        return Err(ProtocolError::TooShortHeaderToParse);
    }
    if input[0..4] != MAGIC {
        let mut got = [0u8; 4];
        got.copy_from_slice(&input[0..4]);
        return Err(ProtocolError::InvalidMessageProtocol(got));
    }
    let size = u32::from_le_bytes([input[4], input[5], input[6], input[7]]) as usize;
    if size < MINIMUM_MESSAGE_LENGTH {
        return Err(ProtocolError::InvalidMessageLength(size));
    }
    Ok(size)
}

/// Encodes and decodes messages against one [`Cryptor`].
#[derive(Debug, Clone)]
pub struct Codec {
    cryptor: Arc<Cryptor>,
    max_frame_size: Option<usize>,
}

impl Codec {
    pub fn new(cryptor: Arc<Cryptor>) -> Self {
        Self {
            cryptor,
            max_frame_size: None,
        }
    }

    /// Caps encoded and decoded frame sizes. Unbounded by default.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }

    pub fn max_frame_size(&self) -> Option<usize> {
        self.max_frame_size
    }

    pub fn cryptor(&self) -> &Arc<Cryptor> {
        &self.cryptor
    }

    /// Encodes a message into wire bytes.
    pub fn encode(&self, message: &Message) -> Result<BytesMut, ProtocolError> {
        let bitmask = message.control_bitmask;

        // The compress step is deliberately disabled, not a no-op.
        if bitmask.is_compressed() {
            return Err(ProtocolError::CompressionFailed);
        }

        let mut signable = BytesMut::new();
        signable.put_slice(message.uri.as_bytes());
        signable.put_u8(0);
        if bitmask.contains_meta() {
            let meta = message.meta().ok_or(ProtocolError::MetaSectionNotFound)?;
            signable.put_u32_le(meta.len() as u32);
            signable.put_slice(meta);
        }
        signable.put_slice(&message.payload);

        let signature = self.cryptor.sign(&signable, bitmask, &message.id)?;
        let mut blob = BytesMut::with_capacity(signature.len() + signable.len());
        blob.put_slice(&signature);
        blob.put_slice(&signable);

        let blob = if bitmask.is_encrypted() {
            self.cryptor.encrypt(&blob, &message.id)?
        } else {
            blob.to_vec()
        };

        let total = MESSAGE_HEADER_LENGTH + 16 + 2 + blob.len();
        // An empty URI with no meta and no body would fall below the
        // minimum the decoder accepts; never emit such a frame.
        if total < MINIMUM_MESSAGE_LENGTH {
            return Err(ProtocolError::InvalidMessageLength(total));
        }
        if let Some(max) = self.max_frame_size {
            if total > max {
                return Err(ProtocolError::EncodingFailed { size: total, max });
            }
        }

        let mut frame = BytesMut::with_capacity(total);
        frame.put_slice(&MAGIC);
        frame.put_u32_le(total as u32);
        frame.put_slice(message.id.as_bytes());
        frame.put_u16_le(bitmask.bits());
        frame.put_slice(&blob);
        Ok(frame)
    }

    /// Decodes one complete frame.
    ///
    /// The input must hold the whole frame; shorter input yields the soft
    /// [`ProtocolError::TooShortHeaderToParse`]. Trailing bytes past the
    /// declared SIZE are ignored.
    pub fn decode(&self, input: &[u8]) -> Result<Message, ProtocolError> {
        if input == ERROR_SENTINEL {
            return Err(ProtocolError::InvalidMessage);
        }
        if input.len() < MINIMUM_MESSAGE_LENGTH {
            return Err(ProtocolError::TooShortHeaderToParse);
        }

        let size = parse_frame_length(input)?;
        if let Some(max) = self.max_frame_size {
            if size > max {
                return Err(ProtocolError::InvalidMessageLength(size));
            }
        }
        if input.len() < size {
            return Err(ProtocolError::TooShortHeaderToParse);
        }

        let id = Uuid::from_slice(&input[8..24])
            .map_err(|e| ProtocolError::ParsingFailed(e.to_string()))?;
        let bitmask = ControlBitmask::from_bits(u16::from_le_bytes([input[24], input[25]]));

        if bitmask.is_compressed() {
            return Err(ProtocolError::DecompressionFailed);
        }

        let mut rest = input[26..size].to_vec();
        if bitmask.is_encrypted() {
            rest = self.cryptor.decrypt(&rest, &id)?;
        }

        // The signature check is mandatory and runs before URI parsing.
        if let Some(algorithm) = bitmask.signature_algorithm() {
            let signature_length = algorithm.digest_length();
            if rest.len() < signature_length {
                return Err(ProtocolError::InvalidMessageLength(rest.len()));
            }
            let (signature, remainder) = rest.split_at(signature_length);
            self.cryptor.verify(remainder, signature, bitmask, &id)?;
            rest = remainder.to_vec();
        }

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::URIParsingFailed)?;
        let uri = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ProtocolError::URIParsingFailed)?;
        if !uri.is_ascii() {
            return Err(ProtocolError::URIParsingFailed);
        }
        let uri = uri.to_string();
        let mut cursor = nul + 1;

        let meta = if bitmask.contains_meta() {
            if rest.len() < cursor + 4 {
                return Err(ProtocolError::MetaSectionNotFound);
            }
            let meta_size = u32::from_le_bytes([
                rest[cursor],
                rest[cursor + 1],
                rest[cursor + 2],
                rest[cursor + 3],
            ]) as usize;
            cursor += 4;
            if rest.len() < cursor + meta_size {
                return Err(ProtocolError::InvalidMessageLength(rest.len()));
            }
            let meta = Bytes::copy_from_slice(&rest[cursor..cursor + meta_size]);
            cursor += meta_size;
            Some(meta)
        } else {
            None
        };

        let payload = Bytes::copy_from_slice(&rest[cursor..]);
        Ok(Message::from_wire(uri, payload, meta, bitmask, id))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::message::SignatureAlgorithm;
    use proptest::prelude::*;

    fn prop_codec() -> Codec {
        let cryptor = Cryptor::new("saltine", vec![3u8; 32]).unwrap();
        Codec::new(Arc::new(cryptor))
    }

    fn arb_bitmask() -> impl Strategy<Value = ControlBitmask> {
        (any::<bool>(), any::<bool>(), 0u8..4).prop_map(|(keep_alive, encrypted, sig)| {
            let mut bitmask = ControlBitmask::new();
            if keep_alive {
                bitmask = bitmask.with_keep_alive();
            }
            if encrypted {
                bitmask = bitmask.with_encrypted();
            }
            bitmask = match sig {
                1 => bitmask.with_signature(SignatureAlgorithm::Sha256),
                2 => bitmask.with_signature(SignatureAlgorithm::Sha384),
                3 => bitmask.with_signature(SignatureAlgorithm::Sha512),
                _ => bitmask,
            };
            bitmask
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            uri in "[a-zA-Z0-9/_.-]{1,64}",
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            bitmask in arb_bitmask(),
        ) {
            let codec = prop_codec();
            let message = Message::new(uri, payload).with_bitmask(bitmask);
            let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
            prop_assert_eq!(&decoded, &message);
            prop_assert_eq!(decoded.control_bitmask, message.control_bitmask);
        }
    }
}
