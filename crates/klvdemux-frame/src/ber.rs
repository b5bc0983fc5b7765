//! BER length fields.
//!
//! ```text
//! short form:  0xxxxxxx                    length = x (0..=127)
//! long form:   1nnnnnnn  b1 b2 .. bn       length = big-endian(b1..bn)
//! ```
//!
//! `n == 0` (octet `0x80`) is accepted and decodes to length 0.

use bytes::{BufMut, Bytes, BytesMut};
use klvdemux_source::ByteSource;
use tracing::trace;

use crate::error::{FrameError, Result, Stage};

const LONG_FORM_FLAG: u8 = 0x80;

/// A decoded BER length together with the exact bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BerLength {
    value: u64,
    raw: Bytes,
}

impl BerLength {
    /// Minimal encoding of `value`.
    pub fn encode(value: u64) -> Self {
        let mut raw = BytesMut::with_capacity(9);
        encode_ber_length(value, &mut raw);
        Self {
            value,
            raw: raw.freeze(),
        }
    }

    pub(crate) fn from_parts(value: u64, raw: Bytes) -> Self {
        Self { value, raw }
    }

    /// The decoded length of the value field.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The encoded length field as it appeared on the wire.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Number of bytes the length field occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_long_form(&self) -> bool {
        self.raw.first().is_some_and(|octet| octet & LONG_FORM_FLAG != 0)
    }
}

/// Read one BER length field from a source positioned right after a key.
///
/// A short read anywhere inside the field surfaces as
/// [`FrameError::EndOfStream`] at [`Stage::Length`]. No upper bound is
/// applied to the decoded length.
pub fn decode_ber_length<S: ByteSource + ?Sized>(source: &mut S) -> Result<BerLength> {
    let first = source
        .read_exact(1)
        .map_err(|err| FrameError::from_source(err, Stage::Length, 1))?;
    let octet = first[0];

    if octet & LONG_FORM_FLAG == 0 {
        return Ok(BerLength::from_parts(u64::from(octet), first));
    }

    let count = usize::from(octet & !LONG_FORM_FLAG);
    let tail = source.read_exact(count).map_err(|err| {
        match FrameError::from_source(err, Stage::Length, 1 + count as u64) {
            // The initial octet already arrived.
            FrameError::EndOfStream(mut eos) => {
                eos.received += 1;
                FrameError::EndOfStream(eos)
            }
            other => other,
        }
    })?;
    let value = be_to_u64(&tail);
    trace!(count, value, "decoded long-form length");

    let mut raw = BytesMut::with_capacity(1 + count);
    raw.put_u8(octet);
    raw.put_slice(&tail);
    Ok(BerLength::from_parts(value, raw.freeze()))
}

/// Decode a BER length from the start of `data`.
///
/// Returns `(length, bytes consumed)`, or `None` when `data` does not hold
/// the complete field yet.
pub fn decode_ber_length_slice(data: &[u8]) -> Option<(u64, usize)> {
    let (&octet, rest) = data.split_first()?;
    if octet & LONG_FORM_FLAG == 0 {
        return Some((u64::from(octet), 1));
    }

    let count = usize::from(octet & !LONG_FORM_FLAG);
    let tail = rest.get(..count)?;
    Some((be_to_u64(tail), 1 + count))
}

/// Append the minimal BER encoding of `length` to `dst`.
pub fn encode_ber_length(length: u64, dst: &mut BytesMut) {
    if length < u64::from(LONG_FORM_FLAG) {
        dst.put_u8(length as u8);
        return;
    }

    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    dst.put_u8(LONG_FORM_FLAG | significant.len() as u8);
    dst.put_slice(significant);
}

/// Big-endian unsigned value of `bytes`, saturating at `u64::MAX`.
fn be_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| {
        acc.checked_mul(256)
            .and_then(|shifted| shifted.checked_add(u64::from(b)))
            .unwrap_or(u64::MAX)
    })
}
