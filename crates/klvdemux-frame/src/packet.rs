use bytes::{BufMut, Bytes, BytesMut};

use crate::ber::{encode_ber_length, BerLength};
use crate::error::{FrameError, Result};

/// Default KLV key size: a 16-byte SMPTE Universal Label.
pub const DEFAULT_KEY_LENGTH: usize = 16;

/// Opaque KLV key. Compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KlvKey(Bytes);

impl KlvKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for KlvKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for KlvKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

/// A complete KLV packet.
///
/// `value.len() == length.value()` always holds; readers never hand out a
/// packet they could not fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlvPacket {
    key: KlvKey,
    length: BerLength,
    value: Bytes,
}

impl KlvPacket {
    /// Build a packet around `value`, using the minimal BER length encoding.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            key: KlvKey::new(key),
            length: BerLength::encode(value.len() as u64),
            value,
        }
    }

    /// Assemble a packet from parts read off the wire.
    pub(crate) fn from_parts(key: KlvKey, length: BerLength, value: Bytes) -> Self {
        debug_assert_eq!(value.len() as u64, length.value());
        Self { key, length, value }
    }

    pub fn key(&self) -> &KlvKey {
        &self.key
    }

    pub fn length(&self) -> &BerLength {
        &self.length
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// The total wire size of this packet (key + length field + value).
    pub fn wire_size(&self) -> usize {
        self.key.len() + self.length.encoded_len() + self.value.len()
    }

    /// Append the exact wire bytes of this packet, preserving the original
    /// length encoding.
    ///
    /// ```text
    /// ┌────────────────┬──────────────────┬───────────────────┐
    /// │ Key (N bytes)  │ Length (BER)     │ Value             │
    /// │                │ 1 or 1+M bytes   │ (Length bytes)    │
    /// └────────────────┴──────────────────┴───────────────────┘
    /// ```
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_slice(&self.key.0);
        dst.put_slice(self.length.raw());
        dst.put_slice(&self.value);
    }

    /// The exact wire bytes of this packet.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Append a packet built from raw parts using minimal BER length encoding.
pub fn encode_packet(key: &[u8], value: &[u8], dst: &mut BytesMut) {
    dst.reserve(key.len() + 9 + value.len());
    dst.put_slice(key);
    encode_ber_length(value.len() as u64, dst);
    dst.put_slice(value);
}

/// Configuration for KLV framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Key size in bytes. Default: 16.
    pub key_length: usize,
}

impl FrameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_length == 0 {
            return Err(FrameError::InvalidConfig(
                "key length must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}
