use bytes::Bytes;
use klvdemux_source::ByteSource;
use tracing::{debug, error, warn};

use crate::ber::decode_ber_length;
use crate::error::{FrameError, Result, Stage};
use crate::packet::{FrameConfig, KlvKey, KlvPacket};

/// Reads complete KLV packets from a [`ByteSource`].
///
/// Any truncation (inside the key, the length field or the value) yields
/// [`FrameError::EndOfStream`]; callers never see a partial packet.
///
/// Also usable as an iterator of packets; iteration stops at the first
/// error, which stays available through [`KlvFrameReader::end`].
pub struct KlvFrameReader<S> {
    source: S,
    config: FrameConfig,
    packets: u64,
    end: Option<FrameError>,
}

impl<S: ByteSource> KlvFrameReader<S> {
    /// Create a packet reader with default configuration (16-byte keys).
    pub fn new(source: S) -> Self {
        Self::from_parts(source, FrameConfig::default())
    }

    /// Create a packet reader with explicit configuration.
    ///
    /// Fails with [`FrameError::InvalidConfig`] for a zero key length.
    pub fn with_config(source: S, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(source, config))
    }

    fn from_parts(source: S, config: FrameConfig) -> Self {
        Self {
            source,
            config,
            packets: 0,
            end: None,
        }
    }

    /// Read the next complete packet (blocking).
    pub fn next_packet(&mut self) -> Result<KlvPacket> {
        let key_length = self.config.key_length;

        let key = self
            .source
            .read_exact(key_length)
            .map_err(|err| FrameError::from_source(err, Stage::Key, key_length as u64))
            .map_err(|err| self.note_end(err))?;

        let length = decode_ber_length(&mut self.source).map_err(|err| self.note_end(err))?;

        let value = self.read_value(length.value())?;

        self.packets += 1;
        debug!(
            packet = self.packets,
            length = length.value(),
            long_form = length.is_long_form(),
            "framed klv packet"
        );
        Ok(KlvPacket::from_parts(KlvKey::new(key), length, value))
    }

    fn read_value(&mut self, length: u64) -> Result<Bytes> {
        // Lengths beyond the address space can never be satisfied; asking for
        // everything surfaces them as a short read like any other overrun.
        let wanted = usize::try_from(length).unwrap_or(usize::MAX);
        self.source
            .read_exact(wanted)
            .map_err(|err| FrameError::from_source(err, Stage::Value, length))
            .map_err(|err| self.note_end(err))
    }

    fn note_end(&self, err: FrameError) -> FrameError {
        match &err {
            FrameError::EndOfStream(eos) if eos.is_clean() => {
                debug!(packets = self.packets, "klv stream ended at packet boundary");
            }
            FrameError::EndOfStream(eos) => {
                warn!(
                    packets = self.packets,
                    stage = %eos.stage,
                    received = eos.received,
                    expected = eos.expected,
                    "klv stream truncated mid-packet"
                );
            }
            other => {
                error!(packets = self.packets, error = %other, "klv stream read failed");
            }
        }
        err
    }

    /// Number of complete packets read so far.
    pub fn packets_read(&self) -> u64 {
        self.packets
    }

    /// How iteration ended, once it has.
    pub fn end(&self) -> Option<&FrameError> {
        self.end.as_ref()
    }

    /// Take the terminating error recorded by iteration.
    pub fn take_end(&mut self) -> Option<FrameError> {
        self.end.take()
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<S: ByteSource> Iterator for KlvFrameReader<S> {
    type Item = KlvPacket;

    fn next(&mut self) -> Option<KlvPacket> {
        if self.end.is_some() {
            return None;
        }
        match self.next_packet() {
            Ok(packet) => Some(packet),
            Err(err) => {
                self.end = Some(err);
                None
            }
        }
    }
}
