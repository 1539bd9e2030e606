//! Reassembly of LGNP frames from fragmented stream input.

use bytes::BytesMut;

use crate::codec::{parse_frame_length, Codec};
use crate::error::ProtocolError;
use crate::message::Message;

/// Per-connection reassembly state.
///
/// Raw socket chunks go in via [`extend`](Self::extend); complete decoded
/// messages come out of [`next_frame`](Self::next_frame). The accumulator
/// learns the total frame length as soon as the 8-byte header is buffered
/// and then waits for exactly that many bytes, so arbitrary fragmentation
/// (down to 1-byte chunks) reassembles into the same messages as a single
/// contiguous read.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    frame_length: Option<usize>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            frame_length: None,
        }
    }

    /// Appends a raw chunk from the socket.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete message, or `Ok(None)` if more bytes are
    /// needed. The soft [`ProtocolError::TooShortHeaderToParse`] is
    /// swallowed here; any other error is a connection fault and the
    /// caller must close the connection.
    pub fn next_frame(&mut self, codec: &Codec) -> Result<Option<Message>, ProtocolError> {
        let frame_length = match self.frame_length {
            Some(length) => length,
            None => match parse_frame_length(&self.buffer) {
                Ok(length) => {
                    if let Some(max) = codec.max_frame_size() {
                        if length > max {
                            return Err(ProtocolError::InvalidMessageLength(length));
                        }
                    }
                    self.frame_length = Some(length);
                    length
                }
                Err(e) if e.is_soft() => return Ok(None),
                Err(e) => return Err(e),
            },
        };

        if self.buffer.len() < frame_length {
            return Ok(None);
        }

        let frame = self.buffer.split_to(frame_length);
        self.frame_length = None;
        let message = codec.decode(&frame)?;
        Ok(Some(message))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops all buffered bytes and any learned frame length.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frame_length = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptor::Cryptor;
    use crate::message::{ControlBitmask, SignatureAlgorithm};
    use bytes::Bytes;
    use std::sync::Arc;

    fn test_codec() -> Codec {
        Codec::new(Arc::new(Cryptor::new("saltine", vec![3u8; 32]).unwrap()))
    }

    #[test]
    fn test_whole_frame_at_once() {
        let codec = test_codec();
        let message = Message::new("/ping", Bytes::from_static(b"hi"));
        let encoded = codec.encode(&message).unwrap();

        let mut accumulator = FrameAccumulator::new();
        accumulator.extend(&encoded);
        assert_eq!(accumulator.next_frame(&codec).unwrap().unwrap(), message);
        assert_eq!(accumulator.buffered(), 0);
        assert!(accumulator.next_frame(&codec).unwrap().is_none());
    }

    #[test]
    fn test_one_byte_fragmentation() {
        let codec = test_codec();
        let message = Message::new("/frag", Bytes::from_static(b"fragmented payload"))
            .with_bitmask(ControlBitmask::new().with_signature(SignatureAlgorithm::Sha256));
        let encoded = codec.encode(&message).unwrap();

        let mut accumulator = FrameAccumulator::new();
        let mut decoded = Vec::new();
        for byte in encoded.iter() {
            accumulator.extend(std::slice::from_ref(byte));
            if let Some(m) = accumulator.next_frame(&codec).unwrap() {
                decoded.push(m);
            }
        }
        assert_eq!(decoded, vec![message]);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let codec = test_codec();
        let first = Message::new("/a", Bytes::from_static(b"1"));
        let second = Message::new("/b", Bytes::from_static(b"2"));

        let mut chunk = codec.encode(&first).unwrap();
        chunk.extend_from_slice(&codec.encode(&second).unwrap());

        let mut accumulator = FrameAccumulator::new();
        accumulator.extend(&chunk);
        assert_eq!(accumulator.next_frame(&codec).unwrap().unwrap(), first);
        assert_eq!(accumulator.next_frame(&codec).unwrap().unwrap(), second);
        assert!(accumulator.next_frame(&codec).unwrap().is_none());
    }

    #[test]
    fn test_frame_straddling_chunks() {
        let codec = test_codec();
        let first = Message::new("/a", Bytes::from_static(b"1"));
        let second = Message::new("/b", Bytes::from_static(b"2"));

        let mut wire = codec.encode(&first).unwrap().to_vec();
        wire.extend_from_slice(&codec.encode(&second).unwrap());

        // Split in the middle of the second frame's header.
        let split = codec.encode(&first).unwrap().len() + 3;
        let mut accumulator = FrameAccumulator::new();
        accumulator.extend(&wire[..split]);
        assert_eq!(accumulator.next_frame(&codec).unwrap().unwrap(), first);
        assert!(accumulator.next_frame(&codec).unwrap().is_none());

        accumulator.extend(&wire[split..]);
        assert_eq!(accumulator.next_frame(&codec).unwrap().unwrap(), second);
    }

    #[test]
    fn test_bad_magic_is_a_hard_error() {
        let codec = test_codec();
        let mut accumulator = FrameAccumulator::new();
        accumulator.extend(b"GET / HTTP/1.1\r\n");
        assert!(matches!(
            accumulator.next_frame(&codec).unwrap_err(),
            ProtocolError::InvalidMessageProtocol(_)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_before_buffering_it() {
        let codec = test_codec().with_max_frame_size(64);
        let big = Codec::new(codec.cryptor().clone())
            .encode(&Message::new("/x", Bytes::from(vec![0u8; 256])))
            .unwrap();

        let mut accumulator = FrameAccumulator::new();
        // Only the header arrives; the length alone must fault the connection.
        accumulator.extend(&big[..8]);
        assert!(matches!(
            accumulator.next_frame(&codec).unwrap_err(),
            ProtocolError::InvalidMessageLength(_)
        ));
    }

    #[test]
    fn test_clear_resets_state() {
        let codec = test_codec();
        let encoded = codec.encode(&Message::new("/x", Bytes::new())).unwrap();

        let mut accumulator = FrameAccumulator::new();
        accumulator.extend(&encoded[..10]);
        assert!(accumulator.next_frame(&codec).unwrap().is_none());
        accumulator.clear();
        assert_eq!(accumulator.buffered(), 0);

        accumulator.extend(&encoded);
        assert!(accumulator.next_frame(&codec).unwrap().is_some());
    }
}
