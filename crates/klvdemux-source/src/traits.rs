use bytes::Bytes;

use crate::error::Result;

/// A sequential, blocking, exact-count byte reader.
///
/// `read_exact(n)` blocks until `n` bytes are available or the stream is
/// exhausted. Exhaustion is reported as [`SourceError::ShortRead`] carrying
/// the bytes that did arrive; it is never an I/O failure.
///
/// [`SourceError::ShortRead`]: crate::SourceError::ShortRead
pub trait ByteSource {
    /// Read exactly `n` bytes.
    fn read_exact(&mut self, n: usize) -> Result<Bytes>;

    /// Total bytes consumed from the stream so far, including short reads.
    fn position(&self) -> u64;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        (**self).read_exact(n)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        (**self).read_exact(n)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}
