//! `tokio_util` codecs for KLV packets and raw video frames.
//!
//! Incomplete input is never an error: `decode_eof` records where a trailing
//! partial unit stopped and ends the stream, the same way the blocking
//! readers report [`EndOfStream`].

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::ber::{decode_ber_length_slice, BerLength};
use crate::error::{EndOfStream, FrameError, Stage};
use crate::packet::{FrameConfig, KlvKey, KlvPacket};
use crate::video::VideoFormat;

/// Cap on speculative buffer growth while waiting for a large value.
const MAX_RESERVE: usize = 1024 * 1024;

/// Decoder/encoder for KLV packets.
#[derive(Debug, Clone, Default)]
pub struct KlvCodec {
    config: FrameConfig,
    packets: u64,
    truncation: Option<EndOfStream>,
}

impl KlvCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            packets: 0,
            truncation: None,
        }
    }

    /// Number of complete packets decoded.
    pub fn packets_decoded(&self) -> u64 {
        self.packets
    }

    /// Where the stream stopped mid-packet, if it did.
    pub fn truncation(&self) -> Option<&EndOfStream> {
        self.truncation.as_ref()
    }

    fn classify_partial(&self, buf: &[u8]) -> EndOfStream {
        let key_length = self.config.key_length;
        if buf.len() < key_length {
            return EndOfStream {
                stage: Stage::Key,
                expected: key_length as u64,
                received: buf.len(),
            };
        }

        let after_key = &buf[key_length..];
        match decode_ber_length_slice(after_key) {
            None => {
                let expected = after_key
                    .first()
                    .map(|&octet| 1 + u64::from(octet & 0x7F))
                    .unwrap_or(1);
                EndOfStream {
                    stage: Stage::Length,
                    expected,
                    received: after_key.len(),
                }
            }
            Some((length, consumed)) => EndOfStream {
                stage: Stage::Value,
                expected: length,
                received: after_key.len() - consumed,
            },
        }
    }
}

impl Decoder for KlvCodec {
    type Item = KlvPacket;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<KlvPacket>, FrameError> {
        let key_length = self.config.key_length;
        if src.len() <= key_length {
            return Ok(None);
        }

        let Some((length, consumed)) = decode_ber_length_slice(&src[key_length..]) else {
            return Ok(None);
        };

        let header = key_length + consumed;
        let total = usize::try_from(length)
            .ok()
            .and_then(|value_len| header.checked_add(value_len));
        let Some(total) = total else {
            // Never satisfiable; keep buffering until EOF reports it.
            return Ok(None);
        };

        if src.len() < total {
            src.reserve((total - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        let key = KlvKey::new(src.split_to(key_length).freeze());
        let raw_length = src.split_to(consumed).freeze();
        let value = src.split_to(total - header).freeze();

        self.packets += 1;
        Ok(Some(KlvPacket::from_parts(
            key,
            BerLength::from_parts(length, raw_length),
            value,
        )))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<KlvPacket>, FrameError> {
        if let Some(packet) = self.decode(buf)? {
            return Ok(Some(packet));
        }

        if buf.is_empty() {
            debug!(packets = self.packets, "klv stream ended at packet boundary");
        } else {
            let eos = self.classify_partial(buf);
            warn!(
                packets = self.packets,
                stage = %eos.stage,
                received = eos.received,
                expected = eos.expected,
                "klv stream truncated mid-packet"
            );
            self.truncation = Some(eos);
            buf.clear();
        }
        Ok(None)
    }
}

impl Encoder<&KlvPacket> for KlvCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &KlvPacket, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode(dst);
        Ok(())
    }
}

/// Decoder for fixed-size raw video frames.
#[derive(Debug, Clone)]
pub struct RawVideoCodec {
    frame_size: usize,
    frames: u64,
    truncation: Option<EndOfStream>,
}

impl RawVideoCodec {
    pub fn new(format: &VideoFormat) -> Result<Self, FrameError> {
        Ok(Self {
            frame_size: format.frame_size()?,
            frames: 0,
            truncation: None,
        })
    }

    /// Number of complete frames decoded.
    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    /// Where the stream stopped mid-frame, if it did.
    pub fn truncation(&self) -> Option<&EndOfStream> {
        self.truncation.as_ref()
    }
}

impl Decoder for RawVideoCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < self.frame_size {
            src.reserve((self.frame_size - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }
        self.frames += 1;
        Ok(Some(src.split_to(self.frame_size).freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        if !buf.is_empty() {
            let eos = EndOfStream {
                stage: Stage::Frame,
                expected: self.frame_size as u64,
                received: buf.len(),
            };
            warn!(
                frames = self.frames,
                received = eos.received,
                "video stream truncated mid-frame"
            );
            self.truncation = Some(eos);
            buf.clear();
        }
        Ok(None)
    }
}
