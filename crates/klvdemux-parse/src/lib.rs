//! Local-set decoding of KLV packet values.
//!
//! The value of an outer KLV packet is itself a run of `(tag, BER length,
//! value)` items. [`KlvPacketParser`] walks those items lazily, in wire
//! order, and asks a [`TagDictionary`] how to decode each one. Tags the
//! dictionary does not know are still emitted with their raw bytes.
//!
//! The crate ships no tag semantics of its own: dictionaries are built in
//! code or loaded from JSON ([`Dictionary::from_path`]).

pub mod config;
pub mod dictionary;
pub mod error;
pub mod item;
pub mod parser;
pub mod rules;
pub mod tag;

pub use config::{DictionaryConfig, ParserConfig};
pub use dictionary::{Dictionary, EmptyDictionary, TagDictionary};
pub use error::{DecodeError, DictionaryError, MalformedNesting, Result};
pub use item::{DecodedValue, ItemValue, MetadataItem, ParseStatus};
pub use parser::{KlvPacketParser, MetadataItems};
pub use rules::{DecodeRule, Rule, RuleKind};
pub use tag::{decode_ber_oid, encode_ber_oid, TagForm};
