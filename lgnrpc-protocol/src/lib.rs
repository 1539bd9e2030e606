//! # lgnrpc-protocol
//!
//! Wire protocol implementation for lgnrpc (LGNP - a compact binary RPC
//! framing protocol).
//!
//! This crate provides:
//! - The [`Message`] data model and its packed [`ControlBitmask`] flags
//! - [`Cryptor`]: AES-CBC encryption and HMAC signing keyed per instance
//! - [`Codec`]: byte-exact frame encoding and decoding
//! - [`FrameAccumulator`]: reassembly of frames from fragmented stream input
//! - The closed [`ProtocolError`] taxonomy

pub mod accumulator;
pub mod codec;
pub mod cryptor;
pub mod error;
pub mod message;
pub mod meta;

pub use accumulator::FrameAccumulator;
pub use codec::{
    parse_frame_length, Codec, ERROR_SENTINEL, MAGIC, MESSAGE_HEADER_LENGTH,
    MINIMUM_MESSAGE_LENGTH,
};
pub use cryptor::{Cryptor, MAX_KEY_LENGTH, MAX_SALT_LENGTH, MIN_SALT_LENGTH};
pub use error::ProtocolError;
pub use message::{ContentType, ControlBitmask, Message, SignatureAlgorithm};
pub use meta::Meta;

/// Default port for lgnrpc servers.
pub const DEFAULT_PORT: u16 = 7201;
