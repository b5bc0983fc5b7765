use std::path::PathBuf;

use bytes::Bytes;

/// The upstream stream ended before a read could be satisfied.
///
/// This is the expected termination signal of every reader loop, not a
/// failure. `data` holds the bytes that did arrive (possibly none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortRead {
    /// Number of bytes the caller asked for.
    pub requested: usize,
    /// Bytes collected before the stream ended.
    pub data: Bytes,
}

impl ShortRead {
    /// Number of bytes actually received.
    pub fn received(&self) -> usize {
        self.data.len()
    }

    /// True when the stream ended exactly at a read boundary.
    pub fn is_clean(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Display for ShortRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "short read ({} of {} bytes)",
            self.received(),
            self.requested
        )
    }
}

/// Errors that can occur while pulling bytes from a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The stream was exhausted before the requested byte count arrived.
    #[error("{0}")]
    ShortRead(ShortRead),

    /// Failed to open the specified path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the underlying handle.
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// True for the end-of-stream signal, false for genuine failures.
    pub fn is_short_read(&self) -> bool {
        matches!(self, SourceError::ShortRead(_))
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_short_read_has_no_data() {
        let short = ShortRead {
            requested: 16,
            data: Bytes::new(),
        };
        assert!(short.is_clean());
        assert_eq!(short.received(), 0);
    }

    #[test]
    fn partial_short_read_reports_received() {
        let err = SourceError::ShortRead(ShortRead {
            requested: 16,
            data: Bytes::from_static(&[1, 2, 3]),
        });
        assert!(err.is_short_read());
        assert_eq!(err.to_string(), "short read (3 of 16 bytes)");
    }
}
