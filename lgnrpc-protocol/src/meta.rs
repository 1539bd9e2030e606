//! Typed view over the out-of-band meta section.
//!
//! The meta blob is a 2-byte sentinel `[0x00, 0xFF]` followed by
//! `key\0value\n` records. Keys and values must not contain NUL or
//! newline bytes; the encoder does not escape them.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Sentinel opening every meta section.
pub const META_SENTINEL: [u8; 2] = [0x00, 0xFF];

const KEY_CLIENT_ADDR: &str = "ip";
const KEY_CLIENT_ID: &str = "cid";
const KEY_USER_AGENT: &str = "ua";
const KEY_LOCALE: &str = "lc";

/// Out-of-band key/value section carried alongside the main payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub client_addr: Option<String>,
    pub client_id: Option<String>,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    /// Custom headers beyond the well-known keys.
    pub extra: BTreeMap<String, String>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Serializes into the wire sub-blob. Well-known keys come first,
    /// custom entries follow in key order, so the output is deterministic.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(&META_SENTINEL);

        let well_known = [
            (KEY_CLIENT_ADDR, &self.client_addr),
            (KEY_CLIENT_ID, &self.client_id),
            (KEY_USER_AGENT, &self.user_agent),
            (KEY_LOCALE, &self.locale),
        ];
        for (key, value) in well_known {
            if let Some(value) = value {
                put_record(&mut buf, key, value);
            }
        }
        for (key, value) in &self.extra {
            put_record(&mut buf, key, value);
        }

        buf.freeze()
    }

    /// Parses a meta blob. Returns `None` when the sentinel is missing or
    /// any record is malformed; callers keep the raw bytes opaque in that
    /// case rather than failing the frame.
    pub fn parse(blob: &[u8]) -> Option<Self> {
        let records = blob.strip_prefix(&META_SENTINEL[..])?;

        let mut meta = Self::new();
        let mut rest = records;
        while !rest.is_empty() {
            let end = rest.iter().position(|&b| b == b'\n')?;
            let record = &rest[..end];
            rest = &rest[end + 1..];

            let nul = record.iter().position(|&b| b == 0)?;
            let key = std::str::from_utf8(&record[..nul]).ok()?;
            let value = std::str::from_utf8(&record[nul + 1..]).ok()?;

            match key {
                KEY_CLIENT_ADDR => meta.client_addr = Some(value.to_string()),
                KEY_CLIENT_ID => meta.client_id = Some(value.to_string()),
                KEY_USER_AGENT => meta.user_agent = Some(value.to_string()),
                KEY_LOCALE => meta.locale = Some(value.to_string()),
                _ => {
                    meta.extra.insert(key.to_string(), value.to_string());
                }
            }
        }

        Some(meta)
    }
}

fn put_record(buf: &mut BytesMut, key: &str, value: &str) {
    buf.put_slice(key.as_bytes());
    buf.put_u8(0);
    buf.put_slice(value.as_bytes());
    buf.put_u8(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_roundtrip() {
        let meta = Meta::new()
            .with_client_addr("10.0.0.7:4422")
            .with_client_id("client-17")
            .with_user_agent("lgnrpc/0.1")
            .with_locale("en_US")
            .with_entry("tenant", "acme");

        let encoded = meta.encode();
        let parsed = Meta::parse(&encoded).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_meta_starts_with_sentinel() {
        let encoded = Meta::new().with_locale("ru_RU").encode();
        assert_eq!(&encoded[..2], &META_SENTINEL);
    }

    #[test]
    fn test_meta_empty_roundtrip() {
        let encoded = Meta::new().encode();
        assert_eq!(encoded.as_ref(), &META_SENTINEL);
        assert_eq!(Meta::parse(&encoded).unwrap(), Meta::new());
    }

    #[test]
    fn test_meta_missing_sentinel() {
        assert!(Meta::parse(b"ip\x0010.0.0.1\n").is_none());
    }

    #[test]
    fn test_meta_truncated_record() {
        let mut encoded = Meta::new().with_client_id("abc").encode().to_vec();
        encoded.pop(); // drop the trailing newline
        assert!(Meta::parse(&encoded).is_none());
    }

    #[test]
    fn test_meta_record_without_nul() {
        assert!(Meta::parse(b"\x00\xffkeyvalue\n").is_none());
    }

    #[test]
    fn test_meta_custom_keys_sorted() {
        let meta = Meta::new().with_entry("z", "1").with_entry("a", "2");
        let encoded = meta.encode();
        let a = encoded.windows(1).position(|w| w == b"a").unwrap();
        let z = encoded.windows(1).position(|w| w == b"z").unwrap();
        assert!(a < z);
    }
}
