use std::process::{Command, Stdio};

use klvdemux_stream::{ChildStream, StreamCoordinator};
use tracing::info;

use crate::cmd::common::{
    coordinator_config, install_ctrlc_handler, load_dictionary, open_dump, FrameLogger,
    PacketPrinter,
};
use crate::cmd::{ExecArgs, Pipe};
use crate::exit::{coordinator_error, io_error, session_code, CliError, CliResult, USAGE};
use crate::output::{print_session, OutputFormat};

pub fn run(args: ExecArgs, format: OutputFormat) -> CliResult<i32> {
    let (program, program_args) = args
        .program
        .split_first()
        .ok_or_else(|| CliError::new(USAGE, "missing program to run"))?;

    let mut config = coordinator_config(&args.video_args, &args.decode)?;
    (config.video_stream, config.klv_stream) = match args.video_on {
        Pipe::Stderr => (ChildStream::Stderr, ChildStream::Stdout),
        Pipe::Stdout => (ChildStream::Stdout, ChildStream::Stderr),
    };

    let dictionary = load_dictionary(args.decode.dictionary.as_deref())?;
    let mut printer = PacketPrinter::new(format, open_dump(args.decode.dump_klv.as_deref())?);
    let mut frames = FrameLogger::new(args.video_args.every);

    let coordinator = StreamCoordinator::new(config);
    install_ctrlc_handler(coordinator.cancel_token())?;

    let child = Command::new(program)
        .args(program_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| io_error(&format!("spawn {program}"), err))?;
    info!(program = %program, pid = child.id(), "demuxer started");

    let report = coordinator
        .run_child(child, &dictionary, &mut frames, &mut printer)
        .map_err(|err| coordinator_error("exec", err))?;
    printer.finish()?;

    print_session(&report, format);
    Ok(session_code(&report))
}
