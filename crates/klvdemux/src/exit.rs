use std::fmt;
use std::io;

use klvdemux_frame::FrameError;
use klvdemux_parse::DictionaryError;
use klvdemux_source::SourceError;
use klvdemux_stream::{CoordinatorError, EndReason, SessionReport};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const STREAM_IO: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;
pub const CANCELLED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        _ => STREAM_IO,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn source_error(context: &str, err: SourceError) -> CliError {
    match err {
        SourceError::Open { source, path } => {
            io_error(&format!("{context} {}", path.display()), source)
        }
        SourceError::Io(source) => io_error(context, source),
        other => CliError::new(STREAM_IO, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::EndOfStream(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn dictionary_error(context: &str, err: DictionaryError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn coordinator_error(context: &str, err: CoordinatorError) -> CliError {
    match err {
        CoordinatorError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        CoordinatorError::MissingPipe(_) | CoordinatorError::Reap(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for a finished session.
///
/// Truncated streams are a normal ending; failed workers outrank
/// cancellation, which outranks an unsuccessful child exit.
pub fn session_code(report: &SessionReport) -> i32 {
    let ends = [&report.video.end, &report.metadata.end];
    if ends.iter().any(|end| matches!(end, EndReason::Failed { .. })) {
        return STREAM_IO;
    }
    if ends.iter().any(|end| matches!(end, EndReason::Cancelled)) {
        return CANCELLED;
    }
    match report.child {
        Some(child) if !child.success => FAILURE,
        _ => SUCCESS,
    }
}
