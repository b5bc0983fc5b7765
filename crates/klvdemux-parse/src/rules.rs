//! Decode rules: how a dictionary turns item bytes into values.

use bytes::Bytes;

use crate::dictionary::{Dictionary, TagDictionary};
use crate::error::DecodeError;
use crate::item::DecodedValue;

/// A capability that decodes the value bytes of one tag.
///
/// The parser never interprets item bytes itself; everything past framing
/// is delegated to the rule the dictionary returns.
pub trait DecodeRule {
    /// Human-readable name reported on decoded items.
    fn name(&self) -> &str;

    fn decode(&self, value: &Bytes) -> Result<DecodedValue, DecodeError>;

    /// Dictionary for a nested local set. When present the parser re-frames
    /// the value recursively instead of calling [`DecodeRule::decode`].
    fn nested(&self) -> Option<&dyn TagDictionary> {
        None
    }
}

/// Built-in rule kinds available to JSON dictionaries.
#[derive(Debug)]
pub enum RuleKind {
    /// Big-endian unsigned integer, 1 to 8 bytes.
    Uint,
    /// Big-endian two's complement integer, 1 to 8 bytes.
    Int,
    Utf8,
    Bytes,
    /// Unsigned integer mapped linearly onto `min..=max`.
    ScaledUint { min: f64, max: f64 },
    /// Signed integer mapped symmetrically onto `min..=max`.
    ScaledInt { min: f64, max: f64 },
    LocalSet(Dictionary),
}

/// A named built-in rule.
#[derive(Debug)]
pub struct Rule {
    name: String,
    kind: RuleKind,
}

impl Rule {
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Uint)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Int)
    }

    pub fn utf8(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Utf8)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Bytes)
    }

    pub fn scaled_uint(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(name, RuleKind::ScaledUint { min, max })
    }

    pub fn scaled_int(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(name, RuleKind::ScaledInt { min, max })
    }

    pub fn local_set(name: impl Into<String>, dictionary: Dictionary) -> Self {
        Self::new(name, RuleKind::LocalSet(dictionary))
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }
}

impl DecodeRule for Rule {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: &Bytes) -> Result<DecodedValue, DecodeError> {
        match &self.kind {
            RuleKind::Uint => be_unsigned(value).map(DecodedValue::Unsigned),
            RuleKind::Int => be_signed(value).map(DecodedValue::Signed),
            RuleKind::Utf8 => Ok(DecodedValue::Text(std::str::from_utf8(value)?.to_owned())),
            RuleKind::Bytes | RuleKind::LocalSet(_) => Ok(DecodedValue::Bytes(value.clone())),
            RuleKind::ScaledUint { min, max } => {
                let raw = be_unsigned(value)?;
                let full_scale = max_unsigned(value.len()) as f64;
                Ok(DecodedValue::Float(min + raw as f64 / full_scale * (max - min)))
            }
            RuleKind::ScaledInt { min, max } => {
                let raw = be_signed(value)?;
                let half_scale = (max_unsigned(value.len()) >> 1) as f64;
                let half_range = (max - min) / 2.0;
                Ok(DecodedValue::Float(
                    raw as f64 / half_scale * half_range + (max + min) / 2.0,
                ))
            }
        }
    }

    fn nested(&self) -> Option<&dyn TagDictionary> {
        match &self.kind {
            RuleKind::LocalSet(dictionary) => Some(dictionary),
            _ => None,
        }
    }
}

fn check_integer_width(value: &[u8]) -> Result<(), DecodeError> {
    if value.is_empty() || value.len() > 8 {
        return Err(DecodeError::BadWidth {
            expected: "1..=8",
            actual: value.len(),
        });
    }
    Ok(())
}

fn be_unsigned(value: &[u8]) -> Result<u64, DecodeError> {
    check_integer_width(value)?;
    Ok(value.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn be_signed(value: &[u8]) -> Result<i64, DecodeError> {
    let raw = be_unsigned(value)?;
    let shift = 64 - 8 * value.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Largest unsigned value representable in `width` bytes (1..=8).
fn max_unsigned(width: usize) -> u64 {
    u64::MAX >> (64 - 8 * width as u32)
}
