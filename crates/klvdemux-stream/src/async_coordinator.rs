//! Single-task variant of [`StreamCoordinator`](crate::StreamCoordinator)
//! for tokio readers.
//!
//! Both streams are driven concurrently with `tokio::join!`. Every read is
//! raced against a [`CancellationToken`], so cancellation takes effect even
//! while a read is pending.

use std::future::poll_fn;
use std::pin::Pin;

use futures_core::Stream;
use klvdemux_frame::{KlvCodec, RawVideoCodec};
use klvdemux_parse::{KlvPacketParser, TagDictionary};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::coordinator::{CoordinatorConfig, SessionReport};
use crate::error::Result;
use crate::sink::{MetadataSink, VideoSink};
use crate::worker::{decode_packet, EndReason, Lifecycle, WorkerKind};

pub struct AsyncStreamCoordinator {
    config: CoordinatorConfig,
    cancel: CancellationToken,
}

impl AsyncStreamCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Consume both readers to completion.
    pub async fn run<V, K, D, VS, MS>(
        &self,
        video: V,
        klv: K,
        dictionary: &D,
        video_sink: &mut VS,
        metadata_sink: &mut MS,
    ) -> Result<SessionReport>
    where
        V: AsyncRead + Unpin,
        K: AsyncRead + Unpin,
        D: TagDictionary,
        VS: VideoSink,
        MS: MetadataSink,
    {
        self.config.frame.validate()?;
        let video_codec = RawVideoCodec::new(&self.config.video)?;
        let klv_codec = KlvCodec::new(self.config.frame);
        let parser = KlvPacketParser::new(self.config.parser);
        let cancel = &self.cancel;

        let video_task = async {
            let mut lifecycle = Lifecycle::start(WorkerKind::Video);
            let mut framed = FramedRead::new(video, video_codec);
            let end = loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break EndReason::Cancelled,
                    next = next_item(&mut framed) => next,
                };
                match next {
                    Some(Ok(frame)) => {
                        let index = framed.decoder().frames_decoded() - 1;
                        if let Err(err) = video_sink.on_frame(index, frame) {
                            break lifecycle.sink_failed(err.as_ref());
                        }
                    }
                    Some(Err(err)) => break lifecycle.read_failed(&err),
                    None => match framed.decoder().truncation() {
                        Some(eos) => break lifecycle.end_of_stream(eos),
                        None => break EndReason::Eof,
                    },
                }
            };
            let frames = framed.decoder().frames_decoded();
            drop(framed);
            lifecycle.close(frames, 0, end)
        };

        let metadata_task = async {
            let mut lifecycle = Lifecycle::start(WorkerKind::Metadata);
            let mut framed = FramedRead::new(klv, klv_codec);
            let mut partial = 0u64;
            let end = loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break EndReason::Cancelled,
                    next = next_item(&mut framed) => next,
                };
                match next {
                    Some(Ok(packet)) => {
                        let index = framed.decoder().packets_decoded() - 1;
                        let decoded = decode_packet(&parser, dictionary, index, packet);
                        if !decoded.status.is_complete() {
                            partial += 1;
                        }
                        if let Err(err) = metadata_sink.on_packet(decoded) {
                            break lifecycle.sink_failed(err.as_ref());
                        }
                    }
                    Some(Err(err)) => break lifecycle.read_failed(&err),
                    None => match framed.decoder().truncation() {
                        Some(eos) => break lifecycle.end_of_stream(eos),
                        None => break EndReason::Eof,
                    },
                }
            };
            let packets = framed.decoder().packets_decoded();
            drop(framed);
            lifecycle.close(packets, partial, end)
        };

        let (video, metadata) = tokio::join!(video_task, metadata_task);
        info!(
            frames = video.units,
            packets = metadata.units,
            "stream workers closed"
        );
        Ok(SessionReport {
            video,
            metadata,
            child: None,
        })
    }
}

async fn next_item<S: Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
    poll_fn(|cx| Pin::new(&mut *stream).poll_next(cx)).await
}
