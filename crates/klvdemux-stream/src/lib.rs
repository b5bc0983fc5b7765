//! Concurrent consumption of a raw video stream and a KLV metadata stream.
//!
//! [`StreamCoordinator`] runs one worker per stream on scoped threads; each
//! worker owns its source, reads until end-of-stream, and hands units to a
//! sink. Neither stream waits on the other.

pub mod control;
pub mod coordinator;
pub mod error;
pub mod sink;
pub mod worker;

#[cfg(feature = "async")]
pub mod async_coordinator;

#[cfg(feature = "async")]
pub use async_coordinator::AsyncStreamCoordinator;
pub use control::CancelToken;
pub use coordinator::{ChildExit, ChildStream, CoordinatorConfig, SessionReport, StreamCoordinator};
pub use error::{CoordinatorError, Result};
pub use sink::{DecodedPacket, MetadataSink, NullSink, SinkError, SinkResult, VideoSink};
pub use worker::{EndReason, StreamState, WorkerKind, WorkerReport};
