use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Result, ShortRead, SourceError};
use crate::traits::ByteSource;

/// Upper bound on a single read step. Requests larger than this grow the
/// buffer incrementally, so a bogus length never allocates up front.
const MAX_READ_STEP: usize = 1024 * 1024;

/// A [`ByteSource`] over any blocking [`Read`] handle.
///
/// Owns the handle for its whole lifetime; dropping the source closes it.
pub struct ReadSource<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ReadSource<R> {
    /// Wrap a readable handle.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Borrow the underlying handle.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying handle.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the source and return the inner handle.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        if n == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::with_capacity(n.min(MAX_READ_STEP));
        while buf.len() < n {
            let filled = buf.len();
            let step = (n - filled).min(MAX_READ_STEP);
            buf.resize(filled + step, 0);

            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    buf.truncate(filled);
                    self.position += filled as u64;
                    debug!(requested = n, received = filled, "source exhausted");
                    return Err(SourceError::ShortRead(ShortRead {
                        requested: n,
                        data: buf.freeze(),
                    }));
                }
                Ok(read) => buf.truncate(filled + read),
                Err(err) if err.kind() == ErrorKind::Interrupted => buf.truncate(filled),
                Err(err) => {
                    self.position += filled as u64;
                    return Err(SourceError::Io(err));
                }
            }
        }

        self.position += n as u64;
        Ok(buf.freeze())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(target_os = "linux")]
impl<R: std::os::fd::AsRawFd> ReadSource<R> {
    /// Resize the kernel buffer of the underlying pipe.
    ///
    /// Returns the capacity actually granted. Fails with `EBADF`/`EINVAL` when
    /// the handle is not a pipe, and `EPERM` above `/proc/sys/fs/pipe-max-size`
    /// for unprivileged processes.
    pub fn set_pipe_capacity(&self, bytes: usize) -> Result<usize> {
        let fd = self.inner.as_raw_fd();
        let requested = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);

        // SAFETY: `fd` is an open descriptor owned by `self.inner` for the
        // duration of the call; F_SETPIPE_SZ takes a plain integer argument.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETPIPE_SZ, requested) };
        if rc < 0 {
            return Err(SourceError::Io(std::io::Error::last_os_error()));
        }
        Ok(rc as usize)
    }
}

/// Open a filesystem path (file or named pipe) as a byte source.
///
/// Opening a FIFO blocks until the producer opens its write end.
pub fn open(path: impl AsRef<Path>) -> Result<ReadSource<File>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "opened byte source");
    Ok(ReadSource::new(file))
}

impl<R> std::fmt::Debug for ReadSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSource")
            .field("position", &self.position)
            .finish()
    }
}
