use bytes::Bytes;
use klvdemux_frame::KlvPacket;
use klvdemux_parse::{MetadataItem, ParseStatus};
use serde_json::{json, Value};

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;
pub type SinkResult = std::result::Result<(), SinkError>;

/// A framed packet together with its decoded items.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    /// Zero-based position of the packet in its stream.
    pub index: u64,
    pub packet: KlvPacket,
    pub items: Vec<MetadataItem>,
    pub status: ParseStatus,
}

impl DecodedPacket {
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "index": self.index,
            "key": self.packet.key().to_string(),
            "length": self.packet.length().value(),
            "items": self.items.iter().map(MetadataItem::to_json).collect::<Vec<_>>(),
        });
        if let ParseStatus::Partial { offset, reason } = &self.status {
            out["partial"] = json!({ "offset": offset, "reason": reason.to_string() });
        }
        out
    }
}

/// Receives decoded metadata packets in wire order.
///
/// Returning an error ends the metadata worker.
pub trait MetadataSink: Send {
    fn on_packet(&mut self, packet: DecodedPacket) -> SinkResult;
}

/// Receives raw video frames in wire order.
///
/// Returning an error ends the video worker.
pub trait VideoSink: Send {
    fn on_frame(&mut self, index: u64, frame: Bytes) -> SinkResult;
}

impl<F> MetadataSink for F
where
    F: FnMut(DecodedPacket) -> SinkResult + Send,
{
    fn on_packet(&mut self, packet: DecodedPacket) -> SinkResult {
        self(packet)
    }
}

impl<F> VideoSink for F
where
    F: FnMut(u64, Bytes) -> SinkResult + Send,
{
    fn on_frame(&mut self, index: u64, frame: Bytes) -> SinkResult {
        self(index, frame)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetadataSink for NullSink {
    fn on_packet(&mut self, _packet: DecodedPacket) -> SinkResult {
        Ok(())
    }
}

impl VideoSink for NullSink {
    fn on_frame(&mut self, _index: u64, _frame: Bytes) -> SinkResult {
        Ok(())
    }
}
