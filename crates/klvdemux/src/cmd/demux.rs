use std::fs::{self, File};
use std::thread;

use klvdemux_source::{open, ReadSource};
use klvdemux_stream::StreamCoordinator;
use tracing::info;

use crate::cmd::common::{
    coordinator_config, install_ctrlc_handler, load_dictionary, open_dump, FrameLogger,
    PacketPrinter,
};
use crate::cmd::DemuxArgs;
use crate::exit::{
    coordinator_error, io_error, session_code, source_error, CliError, CliResult, INTERNAL,
};
use crate::output::{print_session, OutputFormat};

pub fn run(args: DemuxArgs, format: OutputFormat) -> CliResult<i32> {
    let config = coordinator_config(&args.video_args, &args.decode)?;
    let dictionary = load_dictionary(args.decode.dictionary.as_deref())?;
    let mut printer = PacketPrinter::new(format, open_dump(args.decode.dump_klv.as_deref())?);
    let mut frames = FrameLogger::new(args.video_args.every);

    // FIFO opens block until a writer appears: check both paths first, then
    // open them concurrently.
    for (stream, path) in [("video", &args.video), ("klv", &args.klv)] {
        fs::metadata(path)
            .map_err(|err| io_error(&format!("open {stream} {}", path.display()), err))?;
    }
    let (video, klv) = thread::scope(|scope| {
        let klv = scope.spawn(|| open(&args.klv));
        let video = open(&args.video);
        (video, klv.join())
    });
    let video = video.map_err(|err| source_error("open video", err))?;
    let klv = klv
        .map_err(|_| CliError::new(INTERNAL, "klv open thread panicked"))?
        .map_err(|err| source_error("open klv", err))?;

    if let Some(capacity) = config.pipe_capacity {
        enlarge_fifo(&video, capacity);
        enlarge_fifo(&klv, capacity);
    }

    info!(
        video = %args.video.display(),
        klv = %args.klv.display(),
        "demuxing streams"
    );
    let coordinator = StreamCoordinator::new(config);
    install_ctrlc_handler(coordinator.cancel_token())?;

    let report = coordinator
        .run(video, klv, &dictionary, &mut frames, &mut printer)
        .map_err(|err| coordinator_error("demux", err))?;
    printer.finish()?;

    print_session(&report, format);
    Ok(session_code(&report))
}

#[cfg(target_os = "linux")]
fn enlarge_fifo(source: &ReadSource<File>, capacity: usize) {
    // Regular files reject F_SETPIPE_SZ; only FIFOs are affected.
    if let Ok(actual) = source.set_pipe_capacity(capacity) {
        tracing::debug!(requested = capacity, actual, "fifo capacity set");
    }
}

#[cfg(not(target_os = "linux"))]
fn enlarge_fifo(_source: &ReadSource<File>, _capacity: usize) {}
