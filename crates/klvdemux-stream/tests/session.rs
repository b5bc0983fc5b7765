use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::{Bytes, BytesMut};
use klvdemux_frame::{encode_packet, VideoFormat};
use klvdemux_parse::{Dictionary, ItemValue, Rule};
use klvdemux_source::ReadSource;
use klvdemux_stream::{
    CoordinatorConfig, DecodedPacket, EndReason, SinkResult, StreamCoordinator, StreamState,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 2;
const FRAME_SIZE: usize = (WIDTH * HEIGHT * 3) as usize;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        video: VideoFormat::new(WIDTH, HEIGHT),
        ..CoordinatorConfig::default()
    }
}

fn dictionary() -> Dictionary {
    let mut dictionary = Dictionary::new();
    dictionary.register_number(2, Rule::uint("Precision Time Stamp"));
    dictionary
}

/// Three frames, and five packets followed by 7 bytes of a sixth key.
fn fixture() -> (Vec<u8>, Vec<u8>) {
    let video: Vec<u8> = (0..3).flat_map(|i| vec![i as u8; FRAME_SIZE]).collect();

    let mut klv = BytesMut::new();
    for i in 0..5u8 {
        encode_packet(&[0xAA; 16], &[0x02, 0x01, i], &mut klv);
    }
    klv.extend_from_slice(&[0xAA; 7]);
    (video, klv.to_vec())
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "klvdemux-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[cfg(unix)]
#[test]
fn three_frames_and_truncated_sixth_packet_over_pipes() {
    use std::os::unix::net::UnixStream;

    let (video, klv) = fixture();
    let (mut video_tx, video_rx) = UnixStream::pair().expect("socket pair");
    let (mut klv_tx, klv_rx) = UnixStream::pair().expect("socket pair");

    let video_writer = thread::spawn(move || {
        for chunk in video.chunks(5) {
            video_tx.write_all(chunk).expect("video write");
        }
    });
    let klv_writer = thread::spawn(move || {
        for chunk in klv.chunks(3) {
            klv_tx.write_all(chunk).expect("klv write");
        }
    });

    let frames = Arc::new(Mutex::new(Vec::new()));
    let timestamps = Arc::new(Mutex::new(Vec::new()));
    let frame_log = Arc::clone(&frames);
    let timestamp_log = Arc::clone(&timestamps);

    let mut video_sink = move |index: u64, frame: Bytes| -> SinkResult {
        frame_log.lock().expect("lock").push((index, frame[0]));
        Ok(())
    };
    let mut metadata_sink = move |packet: DecodedPacket| -> SinkResult {
        if let ItemValue::Decoded { value, .. } = &packet.items[0].value {
            timestamp_log.lock().expect("lock").push(value.clone());
        }
        Ok(())
    };

    let report = StreamCoordinator::new(config())
        .run(
            ReadSource::new(video_rx),
            ReadSource::new(klv_rx),
            &dictionary(),
            &mut video_sink,
            &mut metadata_sink,
        )
        .expect("session should complete");
    video_writer.join().expect("video writer should finish");
    klv_writer.join().expect("klv writer should finish");

    assert_eq!(report.video.state, StreamState::Closed);
    assert_eq!(report.metadata.state, StreamState::Closed);
    assert_eq!(report.video.units, 3);
    assert_eq!(report.video.end, EndReason::Eof);
    assert_eq!(report.metadata.units, 5);
    assert!(report.metadata.drained);
    assert_eq!(
        report.metadata.end,
        EndReason::Truncated {
            stage: "key",
            expected: 16,
            received: 7,
        }
    );

    assert_eq!(*frames.lock().expect("lock"), [(0, 0), (1, 1), (2, 2)]);
    assert_eq!(timestamps.lock().expect("lock").len(), 5);
}

#[cfg(unix)]
#[test]
fn child_process_pipes_are_consumed_and_reaped() {
    use std::process::{Command, Stdio};

    let (video, klv) = fixture();
    let dir = unique_temp_dir("child");
    let video_path = dir.join("video.raw");
    let klv_path = dir.join("meta.klv");
    std::fs::write(&video_path, &video).expect("write video fixture");
    std::fs::write(&klv_path, &klv).expect("write klv fixture");

    let child = Command::new("sh")
        .arg("-c")
        .arg(r#"cat "$1" >&2; cat "$2""#)
        .arg("sh")
        .arg(&video_path)
        .arg(&klv_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("sh should spawn");

    let mut frames = 0u64;
    let mut packets = 0u64;
    let mut video_sink = |_index: u64, _frame: Bytes| -> SinkResult {
        frames += 1;
        Ok(())
    };
    let mut metadata_sink = |_packet: DecodedPacket| -> SinkResult {
        packets += 1;
        Ok(())
    };

    let report = StreamCoordinator::new(config())
        .run_child(child, &dictionary(), &mut video_sink, &mut metadata_sink)
        .expect("child session should complete");

    assert_eq!((frames, packets), (3, 5));
    let exit = report.child.expect("child exit recorded");
    assert!(exit.success);
    assert!(!exit.killed);

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn child_without_pipes_is_rejected() {
    use std::process::{Command, Stdio};

    let child = Command::new("true")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("true should spawn");

    let err = StreamCoordinator::new(config())
        .run_child(
            child,
            &dictionary(),
            &mut klvdemux_stream::NullSink,
            &mut klvdemux_stream::NullSink,
        )
        .unwrap_err();
    assert!(matches!(err, klvdemux_stream::CoordinatorError::MissingPipe(_)));
}

#[cfg(unix)]
#[test]
fn cancel_kills_a_silent_child_promptly() {
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    let child = Command::new("sh")
        .arg("-c")
        .arg("exec sleep 30")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("sh should spawn");

    let coordinator = StreamCoordinator::new(config());
    let cancel = coordinator.cancel_token().clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let started = Instant::now();
    let report = coordinator
        .run_child(
            child,
            &dictionary(),
            &mut klvdemux_stream::NullSink,
            &mut klvdemux_stream::NullSink,
        )
        .expect("cancelled session should complete");
    canceller.join().expect("canceller should finish");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.video.end, EndReason::Cancelled);
    assert_eq!(report.metadata.end, EndReason::Cancelled);
    let exit = report.child.expect("child exit recorded");
    assert!(exit.killed);
    assert!(!exit.success);
}

#[cfg(unix)]
#[test]
fn child_that_exits_on_its_own_is_not_reported_killed() {
    use std::process::{Command, Stdio};

    let child = Command::new("true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("true should spawn");

    let report = StreamCoordinator::new(config())
        .run_child(
            child,
            &dictionary(),
            &mut klvdemux_stream::NullSink,
            &mut klvdemux_stream::NullSink,
        )
        .expect("session should complete");

    let exit = report.child.expect("child exit recorded");
    assert!(exit.success);
    assert!(!exit.killed);
    assert_eq!(report.video.end, EndReason::Eof);
}
