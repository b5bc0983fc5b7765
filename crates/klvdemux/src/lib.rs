//! Demultiplex raw video and KLV metadata streams.
//!
//! An external demuxer (typically ffmpeg) writes raw video frames to one pipe
//! and KLV-encoded metadata to another. klvdemux consumes both concurrently,
//! frames the KLV packets bit-exact, and decodes their local-set items
//! through a pluggable tag dictionary.
//!
//! # Crate Structure
//!
//! - [`source`]: Blocking exact-count byte sources over pipes and files
//! - [`frame`]: BER lengths, KLV packet framing, raw video frames
//! - [`parse`]: Local-set item decoding with tag dictionaries
//! - [`stream`]: Concurrent stream coordination (behind `stream` feature)

/// Re-export source types.
pub mod source {
    pub use klvdemux_source::*;
}

/// Re-export frame types.
pub mod frame {
    pub use klvdemux_frame::*;
}

/// Re-export parse types.
pub mod parse {
    pub use klvdemux_parse::*;
}

/// Re-export stream types (requires `stream` feature).
#[cfg(feature = "stream")]
pub mod stream {
    pub use klvdemux_stream::*;
}
