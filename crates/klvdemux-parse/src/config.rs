use crate::tag::TagForm;

/// Controls how packet values are split into items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Encoding of item tags. Default: one byte (MISB local sets).
    pub tag_form: TagForm,
    /// Maximum local-set nesting depth, counting the top-level value.
    /// Default: 8.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            tag_form: TagForm::Fixed(1),
            max_depth: 8,
        }
    }
}

/// Limits applied when loading dictionaries from files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryConfig {
    /// Maximum bytes allowed per dictionary file.
    pub max_file_size: usize,
    /// Maximum number of tags across all nesting levels.
    pub max_tags: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            max_tags: 4096,
        }
    }
}
