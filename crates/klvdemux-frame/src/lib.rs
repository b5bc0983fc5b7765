//! KLV packet framing and raw video frame extraction.
//!
//! Every KLV packet on the wire is:
//! - A fixed-size key (16 bytes by default, SMPTE Universal Label)
//! - A BER-encoded length (1 byte short form, or 1 + M bytes long form)
//! - A value of exactly the decoded length
//!
//! Readers pull whole units from a [`ByteSource`]: callers get complete
//! packets or frames, or a uniform [`EndOfStream`] signal. Never a partial one.
//!
//! [`ByteSource`]: klvdemux_source::ByteSource

pub mod ber;
pub mod error;
pub mod packet;
pub mod reader;
pub mod video;
pub mod writer;

#[cfg(feature = "async")]
pub mod codec;

pub use ber::{decode_ber_length, decode_ber_length_slice, encode_ber_length, BerLength};
pub use error::{EndOfStream, FrameError, Result, Stage};
pub use packet::{encode_packet, FrameConfig, KlvKey, KlvPacket, DEFAULT_KEY_LENGTH};
pub use reader::KlvFrameReader;
pub use video::{RawVideoFrameReader, VideoFormat};
pub use writer::KlvWriter;

#[cfg(feature = "async")]
pub use codec::{KlvCodec, RawVideoCodec};
