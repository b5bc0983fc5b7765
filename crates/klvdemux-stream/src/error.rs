use crate::coordinator::ChildStream;
use crate::worker::WorkerKind;

/// Coordinator-level failures.
///
/// Stream endings and read failures are not errors here; they are recorded
/// per worker in its [`WorkerReport`](crate::WorkerReport).
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Stream geometry or framing parameters are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started.
    #[error("failed to start {0} worker: {1}")]
    Spawn(WorkerKind, #[source] std::io::Error),

    /// A worker thread panicked.
    #[error("{0} worker panicked")]
    WorkerPanicked(WorkerKind),

    /// The external process was started without the expected pipe.
    #[error("child process has no {0} pipe")]
    MissingPipe(ChildStream),

    /// Waiting on the external process failed.
    #[error("failed to reap child process: {0}")]
    Reap(#[source] std::io::Error),
}

impl From<klvdemux_frame::FrameError> for CoordinatorError {
    fn from(err: klvdemux_frame::FrameError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
