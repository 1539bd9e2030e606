//! The wire message data model and its packed control flags.

use bytes::Bytes;
use uuid::Uuid;

use crate::meta::Meta;

/// Signature algorithm selected by the control bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl SignatureAlgorithm {
    /// Fixed digest length in bytes.
    pub fn digest_length(&self) -> usize {
        match self {
            SignatureAlgorithm::Sha256 => 32,
            SignatureAlgorithm::Sha384 => 48,
            SignatureAlgorithm::Sha512 => 64,
        }
    }
}

/// Content type carried by a message, as advertised in the bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
    MsgPack,
    Json,
    Xml,
}

/// Packed boolean/enum flags controlling framing, crypto and content type
/// for one message. Compatible with bitwise OR aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlBitmask(u16);

impl ControlBitmask {
    /// Keep the connection open after the response is written.
    pub const KEEP_ALIVE: u16 = 1 << 0;
    /// Everything past the bitmask is wrapped in AES encryption.
    pub const ENCRYPTED: u16 = 1 << 1;
    /// Compression flag (defined but deliberately unsupported).
    pub const COMPRESSED: u16 = 1 << 2;
    /// A length-prefixed meta section precedes the body.
    pub const CONTAINS_META: u16 = 1 << 3;
    /// The payload is a structured `"<code> <message>"` error.
    pub const CONTAINS_ERROR: u16 = 1 << 4;
    /// HMAC-SHA256 signature present.
    pub const SIGNATURE_SHA256: u16 = 1 << 5;
    /// HMAC-SHA384 signature present.
    pub const SIGNATURE_SHA384: u16 = 1 << 6;
    /// HMAC-SHA512 signature present.
    pub const SIGNATURE_SHA512: u16 = 1 << 7;
    pub const CONTENT_PLAIN_TEXT: u16 = 1 << 8;
    pub const CONTENT_MSGPACK: u16 = 1 << 9;
    pub const CONTENT_JSON: u16 = 1 << 10;
    pub const CONTENT_XML: u16 = 1 << 11;
    // Bits 12-14 are reserved.

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_keep_alive(mut self) -> Self {
        self.0 |= Self::KEEP_ALIVE;
        self
    }

    pub fn with_encrypted(mut self) -> Self {
        self.0 |= Self::ENCRYPTED;
        self
    }

    pub fn with_compressed(mut self) -> Self {
        self.0 |= Self::COMPRESSED;
        self
    }

    pub fn with_contains_meta(mut self) -> Self {
        self.0 |= Self::CONTAINS_META;
        self
    }

    pub fn with_contains_error(mut self) -> Self {
        self.0 |= Self::CONTAINS_ERROR;
        self
    }

    pub fn with_signature(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.0 |= match algorithm {
            SignatureAlgorithm::Sha256 => Self::SIGNATURE_SHA256,
            SignatureAlgorithm::Sha384 => Self::SIGNATURE_SHA384,
            SignatureAlgorithm::Sha512 => Self::SIGNATURE_SHA512,
        };
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.0 |= match content_type {
            ContentType::PlainText => Self::CONTENT_PLAIN_TEXT,
            ContentType::MsgPack => Self::CONTENT_MSGPACK,
            ContentType::Json => Self::CONTENT_JSON,
            ContentType::Xml => Self::CONTENT_XML,
        };
        self
    }

    pub fn keep_alive(&self) -> bool {
        self.0 & Self::KEEP_ALIVE != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    pub fn contains_meta(&self) -> bool {
        self.0 & Self::CONTAINS_META != 0
    }

    pub fn contains_error(&self) -> bool {
        self.0 & Self::CONTAINS_ERROR != 0
    }

    /// Returns the signature algorithm, if any signature bit is set.
    ///
    /// At most one signature bit is meaningful; when several are set the
    /// weakest wins, matching the encode side.
    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        if self.0 & Self::SIGNATURE_SHA256 != 0 {
            Some(SignatureAlgorithm::Sha256)
        } else if self.0 & Self::SIGNATURE_SHA384 != 0 {
            Some(SignatureAlgorithm::Sha384)
        } else if self.0 & Self::SIGNATURE_SHA512 != 0 {
            Some(SignatureAlgorithm::Sha512)
        } else {
            None
        }
    }

    pub fn has_signature(&self) -> bool {
        self.signature_algorithm().is_some()
    }

    /// Returns whether a structured content type (anything beyond plain
    /// text) is advertised.
    pub fn has_content_type(&self) -> bool {
        self.0 & (Self::CONTENT_MSGPACK | Self::CONTENT_JSON | Self::CONTENT_XML) != 0
    }

    /// Content type with first-match priority msgpack > json > xml > plaintext.
    pub fn content_type(&self) -> ContentType {
        if self.0 & Self::CONTENT_MSGPACK != 0 {
            ContentType::MsgPack
        } else if self.0 & Self::CONTENT_JSON != 0 {
            ContentType::Json
        } else if self.0 & Self::CONTENT_XML != 0 {
            ContentType::Xml
        } else {
            ContentType::PlainText
        }
    }

    /// Returns whether every bit of `required` is also set here.
    pub fn is_superset_of(&self, required: ControlBitmask) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub(crate) fn set(&mut self, flag: u16, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

impl std::ops::BitOr for ControlBitmask {
    type Output = ControlBitmask;

    fn bitor(self, rhs: ControlBitmask) -> ControlBitmask {
        ControlBitmask(self.0 | rhs.0)
    }
}

/// The atomic RPC unit.
///
/// Equality is defined only by `(payload, id, uri)`; flags and meta are
/// excluded so a round-tripped message compares equal to its original.
#[derive(Debug, Clone)]
pub struct Message {
    /// Route identifier. ASCII, no embedded NUL byte.
    pub uri: String,
    /// Opaque application body.
    pub payload: Bytes,
    /// 16 random bytes used for request correlation and as crypto nonce input.
    pub id: Uuid,
    /// Framing, crypto and content-type flags.
    pub control_bitmask: ControlBitmask,
    meta: Option<Bytes>,
}

impl Message {
    /// Creates a message with a fresh random id and empty bitmask.
    pub fn new(uri: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            uri: uri.into(),
            payload: payload.into(),
            id: Uuid::new_v4(),
            control_bitmask: ControlBitmask::new(),
            meta: None,
        }
    }

    /// Replaces the bitmask. The `containsMeta` flag is re-asserted if this
    /// message carries a meta section, so the flag never understates it.
    pub fn with_bitmask(mut self, bitmask: ControlBitmask) -> Self {
        self.control_bitmask = bitmask;
        if self.meta.is_some() {
            self.control_bitmask.set(ControlBitmask::CONTAINS_META, true);
        }
        self
    }

    pub fn with_meta(mut self, meta: impl Into<Bytes>) -> Self {
        self.set_meta(Some(meta.into()));
        self
    }

    /// Attaches a typed meta section in its wire encoding.
    pub fn with_meta_section(self, meta: &Meta) -> Self {
        self.with_meta(meta.encode())
    }

    /// Sets or clears the meta section, keeping the `containsMeta` flag
    /// consistent with whether meta is present.
    pub fn set_meta(&mut self, meta: Option<Bytes>) {
        self.control_bitmask
            .set(ControlBitmask::CONTAINS_META, meta.is_some());
        self.meta = meta;
    }

    pub fn meta(&self) -> Option<&Bytes> {
        self.meta.as_ref()
    }

    /// Parses the meta section into its typed form, if present and well-formed.
    pub fn meta_section(&self) -> Option<Meta> {
        self.meta.as_deref().and_then(Meta::parse)
    }

    pub(crate) fn from_wire(
        uri: String,
        payload: Bytes,
        meta: Option<Bytes>,
        control_bitmask: ControlBitmask,
        id: Uuid,
    ) -> Self {
        let mut message = Self {
            uri,
            payload,
            id,
            control_bitmask,
            meta: None,
        };
        message.set_meta(meta);
        message
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.id == other.id && self.uri == other.uri
    }
}

impl Eq for Message {}
