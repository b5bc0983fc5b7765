//! Per-stream worker loops and their lifecycle.

use std::fmt;

use klvdemux_frame::{
    EndOfStream, FrameConfig, FrameError, KlvFrameReader, KlvPacket, RawVideoFrameReader,
};
use klvdemux_parse::{KlvPacketParser, TagDictionary};
use klvdemux_source::ByteSource;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::control::CancelToken;
use crate::sink::{DecodedPacket, MetadataSink, VideoSink};

/// Lifecycle of one stream worker.
///
/// `Draining` is entered only when the stream ended mid-unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Running,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Video,
    Metadata,
}

impl WorkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Video => "video",
            WorkerKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    /// The stream ended on a unit boundary.
    Eof,
    /// The stream ended inside a unit.
    Truncated {
        stage: &'static str,
        expected: u64,
        received: usize,
    },
    Cancelled,
    /// A read or sink failure.
    Failed { error: String },
}

impl EndReason {
    /// True for the two end-of-stream outcomes.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, EndReason::Eof | EndReason::Truncated { .. })
    }
}

/// Outcome of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub kind: WorkerKind,
    /// Always [`StreamState::Closed`] once the worker has returned.
    pub state: StreamState,
    /// Whether the worker passed through [`StreamState::Draining`].
    pub drained: bool,
    /// Complete frames or packets delivered.
    pub units: u64,
    /// Packets whose items were only partially decoded.
    pub partial_packets: u64,
    pub end: EndReason,
}

pub(crate) struct Lifecycle {
    kind: WorkerKind,
    state: StreamState,
    drained: bool,
}

impl Lifecycle {
    pub(crate) fn start(kind: WorkerKind) -> Self {
        info!(stream = kind.as_str(), "worker started");
        Self {
            kind,
            state: StreamState::Running,
            drained: false,
        }
    }

    fn advance(&mut self, next: StreamState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!(stream = self.kind.as_str(), from = ?self.state, to = ?next, "worker state");
        if next == StreamState::Draining {
            self.drained = true;
        }
        self.state = next;
    }

    pub(crate) fn end_of_stream(&mut self, eos: &EndOfStream) -> EndReason {
        if eos.is_clean() {
            return EndReason::Eof;
        }
        self.advance(StreamState::Draining);
        EndReason::Truncated {
            stage: eos.stage.as_str(),
            expected: eos.expected,
            received: eos.received,
        }
    }

    pub(crate) fn read_failed(&mut self, err: &FrameError) -> EndReason {
        match err {
            FrameError::EndOfStream(eos) => self.end_of_stream(eos),
            other => {
                error!(stream = self.kind.as_str(), error = %other, "stream read failed");
                EndReason::Failed {
                    error: other.to_string(),
                }
            }
        }
    }

    pub(crate) fn sink_failed(&mut self, err: &dyn std::error::Error) -> EndReason {
        error!(stream = self.kind.as_str(), error = %err, "sink rejected unit");
        EndReason::Failed {
            error: format!("sink: {err}"),
        }
    }

    pub(crate) fn close(mut self, units: u64, partial_packets: u64, end: EndReason) -> WorkerReport {
        self.advance(StreamState::Closed);
        info!(stream = self.kind.as_str(), units, end = ?end, "worker closed");
        WorkerReport {
            kind: self.kind,
            state: self.state,
            drained: self.drained,
            units,
            partial_packets,
            end,
        }
    }
}

/// Decode `packet` completely for delivery to a sink.
pub(crate) fn decode_packet(
    parser: &KlvPacketParser,
    dictionary: &dyn TagDictionary,
    index: u64,
    packet: KlvPacket,
) -> DecodedPacket {
    let (items, status) = parser.parse(&packet, dictionary).finish();
    debug!(
        stream = "metadata",
        index,
        key = %packet.key(),
        length = packet.length().value(),
        items = items.len(),
        "packet decoded"
    );
    DecodedPacket {
        index,
        packet,
        items,
        status,
    }
}

/// Read frames until the stream ends or `cancel` fires. The source is
/// dropped before the report is returned.
pub(crate) fn run_video<S, V>(
    source: S,
    frame_size: usize,
    sink: &mut V,
    cancel: &CancelToken,
) -> WorkerReport
where
    S: ByteSource,
    V: VideoSink + ?Sized,
{
    let mut lifecycle = Lifecycle::start(WorkerKind::Video);
    let mut reader = RawVideoFrameReader::with_frame_size(source, frame_size);

    let end = loop {
        if cancel.is_cancelled() {
            break EndReason::Cancelled;
        }
        match reader.next_frame() {
            Ok(frame) => {
                let index = reader.frames_read() - 1;
                debug!(stream = "video", index, "frame read");
                if let Err(err) = sink.on_frame(index, frame) {
                    break lifecycle.sink_failed(err.as_ref());
                }
            }
            // A cancelled producer is killed, which ends the read early.
            Err(_) if cancel.is_cancelled() => break EndReason::Cancelled,
            Err(err) => break lifecycle.read_failed(&err),
        }
    };

    let frames = reader.frames_read();
    drop(reader);
    lifecycle.close(frames, 0, end)
}

/// Frame, decode and deliver packets until the stream ends or `cancel`
/// fires. The source is dropped before the report is returned.
pub(crate) fn run_metadata<S, M>(
    source: S,
    frame: FrameConfig,
    parser: &KlvPacketParser,
    dictionary: &dyn TagDictionary,
    sink: &mut M,
    cancel: &CancelToken,
) -> WorkerReport
where
    S: ByteSource,
    M: MetadataSink + ?Sized,
{
    let mut lifecycle = Lifecycle::start(WorkerKind::Metadata);
    let mut reader = match KlvFrameReader::with_config(source, frame) {
        Ok(reader) => reader,
        Err(err) => {
            let end = lifecycle.read_failed(&err);
            return lifecycle.close(0, 0, end);
        }
    };
    let mut partial = 0u64;

    let end = loop {
        if cancel.is_cancelled() {
            break EndReason::Cancelled;
        }
        match reader.next_packet() {
            Ok(packet) => {
                let index = reader.packets_read() - 1;
                let decoded = decode_packet(parser, dictionary, index, packet);
                if !decoded.status.is_complete() {
                    partial += 1;
                }
                if let Err(err) = sink.on_packet(decoded) {
                    break lifecycle.sink_failed(err.as_ref());
                }
            }
            Err(_) if cancel.is_cancelled() => break EndReason::Cancelled,
            Err(err) => break lifecycle.read_failed(&err),
        }
    };

    let packets = reader.packets_read();
    drop(reader);
    lifecycle.close(packets, partial, end)
}
