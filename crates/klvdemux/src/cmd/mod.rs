use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

mod common;
pub mod demux;
pub mod exec;
pub mod inspect;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Demultiplex a raw video stream and a KLV stream from two paths.
    Demux(DemuxArgs),
    /// Run a demuxer process and consume its stdout/stderr.
    Exec(ExecArgs),
    /// Frame and decode a KLV file.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demux(args) => demux::run(args, format),
        Command::Exec(args) => exec::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// KLV framing and item decoding options.
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// Tag dictionary (JSON) for decoding local-set items.
    #[arg(long, value_name = "FILE", env = "KLVDEMUX_DICTIONARY")]
    pub dictionary: Option<PathBuf>,
    /// KLV key length in bytes.
    #[arg(long, default_value_t = 16, env = "KLVDEMUX_KEY_LENGTH")]
    pub key_length: usize,
    /// Local-set tag length in bytes.
    #[arg(long, default_value_t = 1, conflicts_with = "ber_oid_tags")]
    pub tag_bytes: usize,
    /// Local-set tags are BER-OID encoded.
    #[arg(long)]
    pub ber_oid_tags: bool,
    /// Maximum local-set nesting depth.
    #[arg(long, default_value_t = 8)]
    pub max_depth: usize,
    /// Write every framed packet to FILE, bit-exact.
    #[arg(long, value_name = "FILE")]
    pub dump_klv: Option<PathBuf>,
}

/// Raw video geometry options.
#[derive(Args, Debug, Clone)]
pub struct VideoArgs {
    /// Frame width in pixels.
    #[arg(long, default_value_t = 1280, env = "KLVDEMUX_WIDTH")]
    pub width: u32,
    /// Frame height in pixels.
    #[arg(long, default_value_t = 720, env = "KLVDEMUX_HEIGHT")]
    pub height: u32,
    /// Bytes per pixel (3 for bgr24/rgb24).
    #[arg(long, default_value_t = 3)]
    pub bytes_per_pixel: u32,
    /// Log every Nth video frame.
    #[arg(long, value_name = "N", default_value_t = 60)]
    pub every: u64,
}

#[derive(Args, Debug)]
pub struct DemuxArgs {
    /// Raw video stream (FIFO or file).
    #[arg(long, value_name = "PATH")]
    pub video: PathBuf,
    /// KLV stream (FIFO or file).
    #[arg(long, value_name = "PATH")]
    pub klv: PathBuf,
    #[command(flatten)]
    pub video_args: VideoArgs,
    #[command(flatten)]
    pub decode: DecodeArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Pipe {
    Stdout,
    Stderr,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Child pipe carrying raw video; KLV is read from the other one.
    #[arg(long, value_enum, default_value_t = Pipe::Stderr)]
    pub video_on: Pipe,
    #[command(flatten)]
    pub video_args: VideoArgs,
    #[command(flatten)]
    pub decode: DecodeArgs,
    /// Program and arguments to run.
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub program: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// KLV file to read.
    pub path: PathBuf,
    /// Stop after N packets.
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,
    #[command(flatten)]
    pub decode: DecodeArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
