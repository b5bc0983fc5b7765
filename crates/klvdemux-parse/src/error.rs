/// Inner framing of a packet value is inconsistent.
///
/// Ends the item sequence for that packet only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedNesting {
    /// The value ended inside an item tag.
    #[error("truncated tag")]
    TruncatedTag,

    /// The value ended inside an item length field.
    #[error("truncated length field")]
    TruncatedLength,

    /// An item claims more bytes than the value has left.
    #[error("item claims {length} bytes but only {available} remain")]
    LengthOverrun { length: u64, available: usize },

    /// Local sets are nested deeper than the configured limit.
    #[error("local set exceeds max nesting depth {max_depth}")]
    TooDeep { max_depth: usize },
}

/// A dictionary rule rejected an item's bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The value width is not one the rule accepts.
    #[error("unsupported width {actual} bytes (expected {expected})")]
    BadWidth { expected: &'static str, actual: usize },

    /// The value is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Rule-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur while building or loading a dictionary.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// The dictionary file could not be loaded.
    #[error("failed to load dictionary: {0}")]
    LoadFailed(String),

    /// A tag key could not be parsed.
    #[error("invalid tag key {0:?} (expected decimal number or 0x-prefixed hex)")]
    InvalidTag(String),

    /// A rule definition is inconsistent.
    #[error("invalid rule for tag {tag}: {message}")]
    InvalidRule { tag: String, message: String },

    /// The dictionary is not valid JSON.
    #[error("dictionary is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DictionaryError>;
