use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::DictionaryConfig;
use crate::error::{DictionaryError, Result};
use crate::rules::{DecodeRule, Rule, RuleKind};
use crate::tag::encode_ber_oid;

/// Maps item tags to decode rules.
pub trait TagDictionary {
    /// Rule for `tag` (raw wire bytes), or `None` if the tag is unknown.
    fn lookup(&self, tag: &[u8]) -> Option<&dyn DecodeRule>;
}

impl<T: TagDictionary + ?Sized> TagDictionary for &T {
    fn lookup(&self, tag: &[u8]) -> Option<&dyn DecodeRule> {
        (**self).lookup(tag)
    }
}

impl<T: TagDictionary + ?Sized> TagDictionary for Arc<T> {
    fn lookup(&self, tag: &[u8]) -> Option<&dyn DecodeRule> {
        (**self).lookup(tag)
    }
}

/// A dictionary that knows no tags; every item comes out unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDictionary;

impl TagDictionary for EmptyDictionary {
    fn lookup(&self, _tag: &[u8]) -> Option<&dyn DecodeRule> {
        None
    }
}

/// Tag-keyed table of decode rules.
#[derive(Default)]
pub struct Dictionary {
    rules: HashMap<Vec<u8>, Box<dyn DecodeRule + Send + Sync>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for raw tag bytes, replacing any previous rule.
    pub fn register<R>(&mut self, tag: impl Into<Vec<u8>>, rule: R)
    where
        R: DecodeRule + Send + Sync + 'static,
    {
        self.rules.insert(tag.into(), Box::new(rule));
    }

    /// Register a rule for a numeric tag, stored in its BER-OID encoding.
    ///
    /// Tags below 128 encode to a single byte, so this also addresses
    /// one-byte fixed tags.
    pub fn register_number<R>(&mut self, tag: u64, rule: R)
    where
        R: DecodeRule + Send + Sync + 'static,
    {
        self.register(encode_ber_oid(tag), rule);
    }

    /// Build a dictionary from its JSON form.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_json_str_with_config(json, DictionaryConfig::default())
    }

    pub fn from_json_str_with_config(json: &str, config: DictionaryConfig) -> Result<Self> {
        let file: DictionaryFile = serde_json::from_str(json)?;
        let mut budget = config.max_tags;
        build(file.tags, &mut budget, config.max_tags)
    }

    /// Load a dictionary file.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_path_with_config(path, DictionaryConfig::default())
    }

    /// Load a dictionary file with explicit limits.
    pub fn from_path_with_config(path: &Path, config: DictionaryConfig) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| DictionaryError::LoadFailed(format!("{}: {err}", path.display())))?;
        let metadata = file
            .metadata()
            .map_err(|err| DictionaryError::LoadFailed(err.to_string()))?;
        if !metadata.is_file() {
            return Err(DictionaryError::LoadFailed(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        if metadata.len() > config.max_file_size as u64 {
            return Err(DictionaryError::LoadFailed(format!(
                "dictionary file too large ({} bytes): {}",
                metadata.len(),
                path.display()
            )));
        }

        let read_limit = u64::try_from(config.max_file_size.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| {
                DictionaryError::LoadFailed(format!(
                    "failed reading dictionary {}: {err}",
                    path.display()
                ))
            })?;
        if content.len() > config.max_file_size {
            return Err(DictionaryError::LoadFailed(format!(
                "dictionary file too large while reading: {}",
                path.display()
            )));
        }

        Self::from_json_str_with_config(&content, config)
    }

    pub fn contains(&self, tag: &[u8]) -> bool {
        self.rules.contains_key(tag)
    }

    /// Number of top-level tags.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&[u8]> {
        let mut tags: Vec<&[u8]> = self.rules.keys().map(Vec::as_slice).collect();
        tags.sort_unstable();
        tags
    }
}

impl TagDictionary for Dictionary {
    fn lookup(&self, tag: &[u8]) -> Option<&dyn DecodeRule> {
        self.rules
            .get(tag)
            .map(|rule| rule.as_ref() as &dyn DecodeRule)
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for tag in self.tags() {
            if let Some(rule) = self.rules.get(tag) {
                map.entry(&hex::encode_upper(tag), &rule.name());
            }
        }
        map.finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DictionaryFile {
    tags: BTreeMap<String, RuleSpec>,
}

#[derive(Deserialize)]
struct RuleSpec {
    name: String,
    #[serde(flatten)]
    kind: KindSpec,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KindSpec {
    Uint,
    Int,
    Utf8,
    Bytes,
    ScaledUint { min: f64, max: f64 },
    ScaledInt { min: f64, max: f64 },
    LocalSet { tags: BTreeMap<String, RuleSpec> },
}

fn build(tags: BTreeMap<String, RuleSpec>, budget: &mut usize, max_tags: usize) -> Result<Dictionary> {
    let mut dictionary = Dictionary::new();
    for (key, spec) in tags {
        *budget = budget
            .checked_sub(1)
            .ok_or_else(|| DictionaryError::LoadFailed(format!("tag count exceeds configured max ({max_tags})")))?;

        let tag = parse_tag_key(&key)?;
        if spec.name.trim().is_empty() {
            return Err(DictionaryError::InvalidRule {
                tag: key,
                message: "empty name".to_string(),
            });
        }

        let kind = match spec.kind {
            KindSpec::Uint => RuleKind::Uint,
            KindSpec::Int => RuleKind::Int,
            KindSpec::Utf8 => RuleKind::Utf8,
            KindSpec::Bytes => RuleKind::Bytes,
            KindSpec::ScaledUint { min, max } => {
                check_range(&key, min, max)?;
                RuleKind::ScaledUint { min, max }
            }
            KindSpec::ScaledInt { min, max } => {
                check_range(&key, min, max)?;
                RuleKind::ScaledInt { min, max }
            }
            KindSpec::LocalSet { tags } => RuleKind::LocalSet(build(tags, budget, max_tags)?),
        };
        dictionary.register(tag, Rule::new(spec.name, kind));
    }
    Ok(dictionary)
}

fn check_range(key: &str, min: f64, max: f64) -> Result<()> {
    if min.is_finite() && max.is_finite() && min < max {
        return Ok(());
    }
    Err(DictionaryError::InvalidRule {
        tag: key.to_string(),
        message: format!("scaled range must satisfy min < max (got {min}..{max})"),
    })
}

/// Decimal keys are BER-OID encoded; `0x` keys give the raw tag bytes.
fn parse_tag_key(key: &str) -> Result<Vec<u8>> {
    let trimmed = key.trim();
    if let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return match hex::decode(digits) {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(DictionaryError::InvalidTag(key.to_string())),
        };
    }
    trimmed
        .parse::<u64>()
        .map(encode_ber_oid)
        .map_err(|_| DictionaryError::InvalidTag(key.to_string()))
}
