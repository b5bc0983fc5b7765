use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::{DecodeError, MalformedNesting};

/// One `(tag, value)` item decoded from a packet value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataItem {
    /// Tag bytes exactly as they appeared on the wire.
    pub tag: Bytes,
    /// Numeric form of the tag, when it fits in a `u64`.
    pub tag_number: Option<u64>,
    /// Decoded BER length of the item value.
    pub length: u64,
    /// Item value bytes.
    pub raw: Bytes,
    pub value: ItemValue,
}

impl MetadataItem {
    /// Rule name, if the dictionary knew the tag.
    pub fn name(&self) -> Option<&str> {
        match &self.value {
            ItemValue::Decoded { name, .. } | ItemValue::Invalid { name, .. } => Some(name),
            ItemValue::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.value, ItemValue::Unknown)
    }

    /// JSON rendering used by the CLI and sinks.
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "tag": self.tag_number.map_or_else(|| json!(hex::encode_upper(&self.tag)), |n| json!(n)),
            "length": self.length,
        });
        match &self.value {
            ItemValue::Decoded { name, value } => {
                out["name"] = json!(name);
                out["value"] = value.to_json();
            }
            ItemValue::Unknown => {
                out["unknown"] = json!(true);
                out["raw"] = json!(hex::encode_upper(&self.raw));
            }
            ItemValue::Invalid { name, error } => {
                out["name"] = json!(name);
                out["error"] = json!(error.to_string());
                out["raw"] = json!(hex::encode_upper(&self.raw));
            }
        }
        out
    }
}

/// Outcome of applying the dictionary to one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Decoded { name: String, value: DecodedValue },
    /// No rule for this tag; the raw bytes are kept on the item.
    Unknown,
    /// A rule exists but rejected the bytes.
    Invalid { name: String, error: DecodeError },
}

/// A value produced by a decode rule.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
    /// A nested local set.
    Set {
        items: Vec<MetadataItem>,
        status: ParseStatus,
    },
}

impl DecodedValue {
    pub fn to_json(&self) -> Value {
        match self {
            DecodedValue::Unsigned(v) => json!(v),
            DecodedValue::Signed(v) => json!(v),
            DecodedValue::Float(v) => json!(v),
            DecodedValue::Text(v) => json!(v),
            DecodedValue::Bytes(v) => json!(hex::encode_upper(v)),
            DecodedValue::Set { items, status } => {
                let mut out = json!({
                    "items": items.iter().map(MetadataItem::to_json).collect::<Vec<_>>(),
                });
                if let ParseStatus::Partial { offset, reason } = status {
                    out["partial"] = json!({ "offset": offset, "reason": reason.to_string() });
                }
                out
            }
        }
    }
}

/// Whether a packet value was consumed completely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParseStatus {
    /// Every byte of the value belonged to a well-formed item.
    #[default]
    Complete,
    /// Item framing broke at `offset`; items before it were emitted.
    Partial {
        offset: usize,
        reason: MalformedNesting,
    },
}

impl ParseStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, ParseStatus::Complete)
    }
}
