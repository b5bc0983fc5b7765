use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{FrameError, Result};
use crate::packet::KlvPacket;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes KLV packets bit-exact to any `Write` stream.
///
/// Packets keep the length encoding they were read with, so a stream
/// written back out is byte-identical to the one framed.
pub struct KlvWriter<T> {
    inner: T,
    buf: BytesMut,
    written: u64,
}

impl<T: Write> KlvWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            written: 0,
        }
    }

    /// Write one complete packet (blocking).
    pub fn write_packet(&mut self, packet: &KlvPacket) -> Result<()> {
        self.buf.clear();
        packet.encode(&mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::Io(std::io::Error::from(ErrorKind::WriteZero))),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.written += 1;
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Number of packets written so far.
    pub fn packets_written(&self) -> u64 {
        self.written
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;
    use klvdemux_source::ReadSource;

    use super::*;
    use crate::reader::KlvFrameReader;

    #[test]
    fn written_packets_are_read_back_bit_exact() {
        let mut wire = vec![0xAB; 16];
        wire.extend_from_slice(&[0x84, 0x00, 0x00, 0x00, 0x03, 7, 8, 9]);
        wire.extend_from_slice(&[0xCD; 16]);
        wire.extend_from_slice(&[0x01, 0xFF]);

        let packets: Vec<_> = KlvFrameReader::new(ReadSource::new(Cursor::new(wire.clone()))).collect();
        assert_eq!(packets.len(), 2);

        let mut writer = KlvWriter::new(Vec::new());
        for packet in &packets {
            writer.write_packet(packet).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(writer.packets_written(), 2);
        assert_eq!(writer.into_inner(), wire);
    }

    #[test]
    fn interrupted_write_retries() {
        let mut writer = KlvWriter::new(InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        });
        let packet = KlvPacket::new(Bytes::from_static(&[1; 16]), Bytes::from_static(b"v"));

        writer.write_packet(&packet).unwrap();
        assert_eq!(writer.get_ref().data.len(), packet.wire_size());
    }

    #[test]
    fn zero_write_is_an_error() {
        let mut writer = KlvWriter::new(ZeroWriter);
        let packet = KlvPacket::new(Bytes::from_static(&[1; 16]), Bytes::new());

        let err = writer.write_packet(&packet).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WriteZero));
    }

    struct InterruptedOnce {
        interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
