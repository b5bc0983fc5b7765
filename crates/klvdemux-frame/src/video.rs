use bytes::Bytes;
use klvdemux_source::ByteSource;
use tracing::{debug, error, warn};

use crate::error::{FrameError, Result, Stage};

/// Geometry of a headerless raw video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// 3 for packed 24-bit color (bgr24/rgb24).
    pub bytes_per_pixel: u32,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Bytes per frame, or an error if the geometry is empty or overflows.
    pub fn frame_size(&self) -> Result<usize> {
        let size = u64::from(self.width) * u64::from(self.height) * u64::from(self.bytes_per_pixel);
        match usize::try_from(size) {
            Ok(0) => Err(FrameError::InvalidConfig(format!(
                "video frame size is zero ({}x{}x{})",
                self.width, self.height, self.bytes_per_pixel
            ))),
            Ok(size) => Ok(size),
            Err(_) => Err(FrameError::InvalidConfig(format!(
                "video frame size {size} exceeds addressable memory"
            ))),
        }
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            bytes_per_pixel: 3,
        }
    }
}

/// Reads fixed-size raw video frames from a [`ByteSource`].
pub struct RawVideoFrameReader<S> {
    source: S,
    frame_size: usize,
    frames: u64,
}

impl<S: ByteSource> RawVideoFrameReader<S> {
    /// Create a frame reader for the given geometry.
    pub fn new(source: S, format: &VideoFormat) -> Result<Self> {
        Ok(Self::with_frame_size(source, format.frame_size()?))
    }

    pub fn with_frame_size(source: S, frame_size: usize) -> Self {
        Self {
            source,
            frame_size,
            frames: 0,
        }
    }

    /// Read the next complete frame (blocking).
    pub fn next_frame(&mut self) -> Result<Bytes> {
        match self.source.read_exact(self.frame_size) {
            Ok(frame) => {
                self.frames += 1;
                Ok(frame)
            }
            Err(err) => {
                let err = FrameError::from_source(err, Stage::Frame, self.frame_size as u64);
                match &err {
                    FrameError::EndOfStream(eos) if eos.is_clean() => {
                        debug!(frames = self.frames, "video stream ended at frame boundary");
                    }
                    FrameError::EndOfStream(eos) => {
                        warn!(
                            frames = self.frames,
                            received = eos.received,
                            expected = eos.expected,
                            "video stream truncated mid-frame"
                        );
                    }
                    other => error!(frames = self.frames, error = %other, "video stream read failed"),
                }
                Err(err)
            }
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> S {
        self.source
    }
}
