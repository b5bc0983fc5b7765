use klvdemux_source::SourceError;

/// Where in a unit the stream ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the fixed-size KLV key.
    Key,
    /// Reading the BER length field (initial octet or long-form bytes).
    Length,
    /// Reading the KLV value.
    Value,
    /// Reading a raw video frame.
    Frame,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Key => "key",
            Stage::Length => "length",
            Stage::Value => "value",
            Stage::Frame => "frame",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stream ended before a complete unit could be read.
///
/// Termination is uniform for callers; `stage` and the byte counts exist
/// for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfStream {
    pub stage: Stage,
    /// Bytes the stage needed.
    pub expected: u64,
    /// Bytes the stage got before the stream ended.
    pub received: usize,
}

impl EndOfStream {
    /// True when the stream ended exactly on a unit boundary.
    pub fn is_clean(&self) -> bool {
        matches!(self.stage, Stage::Key | Stage::Frame) && self.received == 0
    }
}

impl std::fmt::Display for EndOfStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            write!(f, "end of stream at {} boundary", self.stage)
        } else {
            write!(
                f,
                "end of stream inside {} ({} of {} bytes)",
                self.stage, self.received, self.expected
            )
        }
    }
}

/// Errors that can occur while framing units from a byte source.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream was exhausted; the normal end of every reader loop.
    #[error("{0}")]
    EndOfStream(EndOfStream),

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reader configuration cannot describe a valid unit.
    #[error("invalid frame configuration: {0}")]
    InvalidConfig(String),
}

impl FrameError {
    /// The end-of-stream detail, if this is the termination signal.
    pub fn end_of_stream(&self) -> Option<&EndOfStream> {
        match self {
            FrameError::EndOfStream(eos) => Some(eos),
            _ => None,
        }
    }

    /// Map a source failure observed while reading `stage`.
    pub(crate) fn from_source(err: SourceError, stage: Stage, expected: u64) -> Self {
        match err {
            SourceError::ShortRead(short) => FrameError::EndOfStream(EndOfStream {
                stage,
                expected,
                received: short.received(),
            }),
            SourceError::Io(io) | SourceError::Open { source: io, .. } => FrameError::Io(io),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use klvdemux_source::ShortRead;

    use super::*;

    #[test]
    fn clean_boundary_only_at_unit_start() {
        let at_key = EndOfStream {
            stage: Stage::Key,
            expected: 16,
            received: 0,
        };
        let mid_key = EndOfStream {
            received: 5,
            ..at_key
        };
        let at_length = EndOfStream {
            stage: Stage::Length,
            expected: 1,
            received: 0,
        };

        assert!(at_key.is_clean());
        assert!(!mid_key.is_clean());
        assert!(!at_length.is_clean());
    }

    #[test]
    fn short_read_maps_to_end_of_stream_with_stage() {
        let err = FrameError::from_source(
            SourceError::ShortRead(ShortRead {
                requested: 256,
                data: Bytes::from_static(&[0; 10]),
            }),
            Stage::Value,
            256,
        );

        let eos = err.end_of_stream().copied().unwrap();
        assert_eq!(eos.stage, Stage::Value);
        assert_eq!(eos.received, 10);
        assert_eq!(err.to_string(), "end of stream inside value (10 of 256 bytes)");
    }

    #[test]
    fn io_failure_stays_io() {
        let err = FrameError::from_source(
            SourceError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
            Stage::Key,
            16,
        );
        assert!(matches!(err, FrameError::Io(_)));
        assert!(err.end_of_stream().is_none());
    }
}
