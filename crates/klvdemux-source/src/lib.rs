//! Blocking exact-count byte sources.
//!
//! The lowest layer of klvdemux. A [`ByteSource`] hands out exactly the
//! number of bytes asked for, or reports a [`ShortRead`] carrying whatever
//! arrived before the upstream producer closed its end.
//!
//! - [`ReadSource`] wraps any [`std::io::Read`] handle (child pipes, FIFOs,
//!   files, in-memory cursors)
//! - [`open`] opens a filesystem path (typically a named pipe) as a source

pub mod error;
pub mod pipe;
pub mod traits;

pub use error::{Result, ShortRead, SourceError};
pub use pipe::{open, ReadSource};
pub use traits::ByteSource;
