use std::fmt;
use std::io::Read;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use klvdemux_frame::{FrameConfig, VideoFormat};
use klvdemux_parse::{KlvPacketParser, ParserConfig, TagDictionary};
use klvdemux_source::{ByteSource, ReadSource};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::control::CancelToken;
use crate::error::{CoordinatorError, Result};
use crate::sink::{MetadataSink, VideoSink};
use crate::worker::{run_metadata, run_video, WorkerKind, WorkerReport};

/// How often the child watcher checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pipe of an external process carrying one of the streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStream {
    Stdout,
    Stderr,
}

impl fmt::Display for ChildStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChildStream::Stdout => "stdout",
            ChildStream::Stderr => "stderr",
        })
    }
}

/// Everything the coordinator needs to know about the two streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub frame: FrameConfig,
    pub video: VideoFormat,
    pub parser: ParserConfig,
    /// Child pipe carrying raw video. Default: stderr.
    pub video_stream: ChildStream,
    /// Child pipe carrying KLV. Default: stdout.
    pub klv_stream: ChildStream,
    /// Requested kernel buffer size for child pipes (Linux only).
    pub pipe_capacity: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            video: VideoFormat::default(),
            parser: ParserConfig::default(),
            video_stream: ChildStream::Stderr,
            klv_stream: ChildStream::Stdout,
            pipe_capacity: Some(1024 * 1024),
        }
    }
}

/// How the external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChildExit {
    pub success: bool,
    pub code: Option<i32>,
    /// Whether the coordinator killed the process.
    pub killed: bool,
}

impl ChildExit {
    fn new(status: ExitStatus, killed: bool) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
            killed,
        }
    }
}

/// Outcome of one demux session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub video: WorkerReport,
    pub metadata: WorkerReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildExit>,
}

/// Runs the video and metadata workers concurrently.
pub struct StreamCoordinator {
    config: CoordinatorConfig,
    cancel: CancelToken,
}

impl StreamCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Consume both sources to completion on two scoped threads.
    ///
    /// Returns once both workers have closed and dropped their sources.
    pub fn run<V, K, D, VS, MS>(
        &self,
        video: V,
        klv: K,
        dictionary: &D,
        video_sink: &mut VS,
        metadata_sink: &mut MS,
    ) -> Result<SessionReport>
    where
        V: ByteSource + Send,
        K: ByteSource + Send,
        D: TagDictionary + Sync,
        VS: VideoSink,
        MS: MetadataSink,
    {
        self.config.frame.validate()?;
        let frame_size = self.config.video.frame_size()?;
        let frame = self.config.frame;
        let parser = KlvPacketParser::new(self.config.parser);
        let cancel = &self.cancel;

        info!(
            frame_size,
            key_length = frame.key_length,
            "starting stream workers"
        );

        thread::scope(|scope| {
            let video_worker = thread::Builder::new()
                .name("klvdemux-video".to_string())
                .spawn_scoped(scope, move || run_video(video, frame_size, video_sink, cancel))
                .map_err(|err| {
                    cancel.cancel();
                    CoordinatorError::Spawn(WorkerKind::Video, err)
                })?;

            let metadata_worker = thread::Builder::new()
                .name("klvdemux-metadata".to_string())
                .spawn_scoped(scope, move || {
                    run_metadata(klv, frame, &parser, dictionary, metadata_sink, cancel)
                })
                .map_err(|err| {
                    cancel.cancel();
                    CoordinatorError::Spawn(WorkerKind::Metadata, err)
                });

            let video = video_worker
                .join()
                .map_err(|_| CoordinatorError::WorkerPanicked(WorkerKind::Video));
            let metadata = metadata_worker?
                .join()
                .map_err(|_| CoordinatorError::WorkerPanicked(WorkerKind::Metadata));

            let report = SessionReport {
                video: video?,
                metadata: metadata?,
                child: None,
            };
            info!(
                frames = report.video.units,
                packets = report.metadata.units,
                "stream workers closed"
            );
            Ok(report)
        })
    }

    /// Consume the two pipes of `child`, then wait for it to exit.
    ///
    /// Cancellation kills the child while the workers are still reading, so
    /// it bounds shutdown even for a child that never closes its pipes. The
    /// child is also killed if a worker failed to start; it is always reaped
    /// before this returns.
    pub fn run_child<D, VS, MS>(
        &self,
        mut child: Child,
        dictionary: &D,
        video_sink: &mut VS,
        metadata_sink: &mut MS,
    ) -> Result<SessionReport>
    where
        D: TagDictionary + Sync,
        VS: VideoSink,
        MS: MetadataSink,
    {
        if self.config.video_stream == self.config.klv_stream {
            return Err(abandon(
                child,
                CoordinatorError::InvalidConfig(format!(
                    "video and klv both mapped to child {}",
                    self.config.video_stream
                )),
            ));
        }

        let capacity = self.config.pipe_capacity;
        let video = take_pipe(&mut child, self.config.video_stream, capacity);
        let klv = take_pipe(&mut child, self.config.klv_stream, capacity);
        let (video, klv) = match (video, klv) {
            (Some(video), Some(klv)) => (video, klv),
            (None, _) => {
                return Err(abandon(child, CoordinatorError::MissingPipe(self.config.video_stream)))
            }
            (_, None) => {
                return Err(abandon(child, CoordinatorError::MissingPipe(self.config.klv_stream)))
            }
        };

        info!(
            pid = child.id(),
            video = %self.config.video_stream,
            klv = %self.config.klv_stream,
            "consuming child process"
        );
        let finished = AtomicBool::new(false);
        let child = Mutex::new(child);
        let (session, killed_on_cancel) = thread::scope(|scope| {
            // Killing the child closes its pipes, which unblocks both workers.
            let watcher = thread::Builder::new()
                .name("klvdemux-child".to_string())
                .spawn_scoped(scope, || {
                    while !finished.load(Ordering::Acquire) {
                        if self.cancel.is_cancelled() {
                            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
                            return kill_if_running(&mut child);
                        }
                        thread::sleep(CANCEL_POLL_INTERVAL);
                    }
                    false
                });
            if let Err(err) = &watcher {
                warn!(error = %err, "child watcher not started; cancellation waits for the child");
            }

            let session = self.run(video, klv, dictionary, video_sink, metadata_sink);
            finished.store(true, Ordering::Release);
            let killed = watcher.is_ok_and(|handle| handle.join().unwrap_or(false));
            (session, killed)
        });

        let mut child = child.into_inner().unwrap_or_else(PoisonError::into_inner);
        let killed = killed_on_cancel || (session.is_err() && kill_if_running(&mut child));
        let status = child.wait().map_err(CoordinatorError::Reap)?;
        let exit = ChildExit::new(status, killed);
        if !exit.success && !killed {
            warn!(code = ?exit.code, "child process exited unsuccessfully");
        } else {
            debug!(code = ?exit.code, "child process reaped");
        }

        let mut report = session?;
        report.child = Some(exit);
        Ok(report)
    }
}

/// Kill `child` if it has not exited yet. Returns whether the kill reached
/// a running process.
fn kill_if_running(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(_)) => false,
        Ok(None) | Err(_) => match child.kill() {
            Ok(()) => {
                info!(pid = child.id(), "child process killed");
                true
            }
            Err(err) => {
                debug!(error = %err, "child already exited");
                false
            }
        },
    }
}

/// Kill and reap a child that will not be consumed.
fn abandon(mut child: Child, err: CoordinatorError) -> CoordinatorError {
    let _ = child.kill();
    let _ = child.wait();
    err
}

type ChildSource = ReadSource<Box<dyn Read + Send>>;

fn take_pipe(child: &mut Child, stream: ChildStream, capacity: Option<usize>) -> Option<ChildSource> {
    let pipe: Box<dyn Read + Send> = match stream {
        ChildStream::Stdout => Box::new(enlarge_pipe(child.stdout.take()?, capacity)),
        ChildStream::Stderr => Box::new(enlarge_pipe(child.stderr.take()?, capacity)),
    };
    Some(ReadSource::new(pipe))
}

#[cfg(target_os = "linux")]
fn enlarge_pipe<P>(pipe: P, capacity: Option<usize>) -> P
where
    P: Read + std::os::fd::AsRawFd,
{
    let Some(capacity) = capacity else {
        return pipe;
    };
    let source = ReadSource::new(pipe);
    match source.set_pipe_capacity(capacity) {
        Ok(actual) => debug!(requested = capacity, actual, "pipe capacity set"),
        Err(err) => debug!(requested = capacity, error = %err, "pipe capacity unchanged"),
    }
    source.into_inner()
}

#[cfg(not(target_os = "linux"))]
fn enlarge_pipe<P: Read>(pipe: P, _capacity: Option<usize>) -> P {
    pipe
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{Bytes, BytesMut};
    use klvdemux_frame::encode_packet;
    use klvdemux_parse::EmptyDictionary;

    use super::*;
    use crate::sink::{NullSink, SinkResult};
    use crate::worker::{EndReason, StreamState};

    fn tiny_config() -> CoordinatorConfig {
        CoordinatorConfig {
            video: VideoFormat::new(2, 2),
            ..CoordinatorConfig::default()
        }
    }

    fn cursor(bytes: Vec<u8>) -> ReadSource<Cursor<Vec<u8>>> {
        ReadSource::new(Cursor::new(bytes))
    }

    #[test]
    fn rejects_zero_sized_video() {
        let config = CoordinatorConfig {
            video: VideoFormat::new(0, 0),
            ..CoordinatorConfig::default()
        };
        let err = StreamCoordinator::new(config)
            .run(
                cursor(Vec::new()),
                cursor(Vec::new()),
                &EmptyDictionary,
                &mut NullSink,
                &mut NullSink,
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidConfig(_)));
    }

    #[test]
    fn empty_streams_close_cleanly() {
        let report = StreamCoordinator::new(tiny_config())
            .run(
                cursor(Vec::new()),
                cursor(Vec::new()),
                &EmptyDictionary,
                &mut NullSink,
                &mut NullSink,
            )
            .unwrap();

        assert_eq!(report.video.end, EndReason::Eof);
        assert_eq!(report.metadata.end, EndReason::Eof);
        assert_eq!(report.video.state, StreamState::Closed);
        assert!(report.child.is_none());
    }

    #[test]
    fn streams_are_independent() {
        let mut klv = BytesMut::new();
        for i in 0..3u8 {
            encode_packet(&[i; 16], &[0x01, 0x01, i], &mut klv);
        }

        let mut frames = Vec::new();
        let mut packets = Vec::new();
        let mut video_sink = |index: u64, frame: Bytes| -> SinkResult {
            frames.push((index, frame.len()));
            Ok(())
        };
        let mut metadata_sink = |packet: crate::sink::DecodedPacket| -> SinkResult {
            packets.push(packet.index);
            Ok(())
        };

        let report = StreamCoordinator::new(tiny_config())
            .run(
                cursor(vec![7; 12 * 4]),
                cursor(klv.to_vec()),
                &EmptyDictionary,
                &mut video_sink,
                &mut metadata_sink,
            )
            .unwrap();

        assert_eq!(frames, [(0, 12), (1, 12), (2, 12), (3, 12)]);
        assert_eq!(packets, [0, 1, 2]);
        assert_eq!(report.video.units, 4);
        assert_eq!(report.metadata.units, 3);
    }

    #[test]
    fn cancelled_session_reads_nothing() {
        let coordinator = StreamCoordinator::new(tiny_config());
        coordinator.cancel_token().cancel();

        let report = coordinator
            .run(
                cursor(vec![0; 24]),
                cursor(vec![0; 24]),
                &EmptyDictionary,
                &mut NullSink,
                &mut NullSink,
            )
            .unwrap();
        assert_eq!(report.video.end, EndReason::Cancelled);
        assert_eq!(report.metadata.end, EndReason::Cancelled);
    }

    #[test]
    fn worker_panic_is_an_error() {
        let mut exploding = |_index: u64, _frame: Bytes| -> SinkResult { panic!("sink exploded") };

        let err = StreamCoordinator::new(tiny_config())
            .run(
                cursor(vec![0; 12]),
                cursor(Vec::new()),
                &EmptyDictionary,
                &mut exploding,
                &mut NullSink,
            )
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::WorkerPanicked(WorkerKind::Video)));
    }

    #[test]
    fn session_report_serializes() {
        let report = StreamCoordinator::new(tiny_config())
            .run(
                cursor(vec![0; 14]),
                cursor(Vec::new()),
                &EmptyDictionary,
                &mut NullSink,
                &mut NullSink,
            )
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["video"]["end"]["reason"], "truncated");
        assert_eq!(json["video"]["end"]["stage"], "frame");
        assert_eq!(json["metadata"]["end"]["reason"], "eof");
        assert!(json.get("child").is_none());
    }
}
