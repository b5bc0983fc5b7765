use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use bytes::Bytes;
use klvdemux_frame::{FrameConfig, KlvWriter, VideoFormat};
use klvdemux_parse::{Dictionary, ParserConfig, TagForm};
use klvdemux_stream::{
    CancelToken, CoordinatorConfig, DecodedPacket, MetadataSink, SinkResult, VideoSink,
};
use tracing::{debug, info};

use crate::cmd::{DecodeArgs, VideoArgs};
use crate::exit::{dictionary_error, frame_error, io_error, CliError, CliResult, INTERNAL};
use crate::output::{print_packet, OutputFormat};

pub fn load_dictionary(path: Option<&Path>) -> CliResult<Dictionary> {
    let Some(path) = path else {
        debug!("no dictionary; all items will be reported as unknown");
        return Ok(Dictionary::new());
    };
    let dictionary = Dictionary::from_path(path)
        .map_err(|err| dictionary_error(&format!("dictionary {}", path.display()), err))?;
    info!(path = %path.display(), tags = dictionary.len(), "dictionary loaded");
    Ok(dictionary)
}

pub fn frame_config(args: &DecodeArgs) -> CliResult<FrameConfig> {
    let config = FrameConfig {
        key_length: args.key_length,
    };
    config
        .validate()
        .map_err(|err| frame_error("--key-length", err))?;
    Ok(config)
}

pub fn parser_config(args: &DecodeArgs) -> ParserConfig {
    let tag_form = if args.ber_oid_tags {
        TagForm::BerOid
    } else {
        TagForm::Fixed(args.tag_bytes)
    };
    ParserConfig {
        tag_form,
        max_depth: args.max_depth,
    }
}

pub fn video_format(args: &VideoArgs) -> CliResult<VideoFormat> {
    let format = VideoFormat {
        width: args.width,
        height: args.height,
        bytes_per_pixel: args.bytes_per_pixel,
    };
    format
        .frame_size()
        .map_err(|err| frame_error("video geometry", err))?;
    Ok(format)
}

pub fn coordinator_config(video: &VideoArgs, decode: &DecodeArgs) -> CliResult<CoordinatorConfig> {
    Ok(CoordinatorConfig {
        frame: frame_config(decode)?,
        video: video_format(video)?,
        parser: parser_config(decode),
        ..CoordinatorConfig::default()
    })
}

pub fn install_ctrlc_handler(cancel: &CancelToken) -> CliResult<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub type DumpWriter = KlvWriter<BufWriter<File>>;

pub fn open_dump(path: Option<&Path>) -> CliResult<Option<DumpWriter>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let file = File::create(path)
        .map_err(|err| io_error(&format!("create {}", path.display()), err))?;
    Ok(Some(KlvWriter::new(BufWriter::new(file))))
}

/// Logs every Nth frame; frames themselves are not retained.
pub struct FrameLogger {
    every: u64,
}

impl FrameLogger {
    pub fn new(every: u64) -> Self {
        Self { every }
    }
}

impl VideoSink for FrameLogger {
    fn on_frame(&mut self, index: u64, frame: Bytes) -> SinkResult {
        if self.every > 0 && index % self.every == 0 {
            info!(stream = "video", frame = index, bytes = frame.len(), "video frame");
        }
        Ok(())
    }
}

/// Prints decoded packets and optionally persists them.
pub struct PacketPrinter {
    format: OutputFormat,
    dump: Option<DumpWriter>,
}

impl PacketPrinter {
    pub fn new(format: OutputFormat, dump: Option<DumpWriter>) -> Self {
        Self { format, dump }
    }

    /// Flush the dump file, if any.
    pub fn finish(self) -> CliResult<()> {
        if let Some(mut dump) = self.dump {
            dump.flush()
                .map_err(|err| frame_error("flush --dump-klv", err))?;
            debug!(packets = dump.packets_written(), "klv dump written");
        }
        Ok(())
    }
}

impl MetadataSink for PacketPrinter {
    fn on_packet(&mut self, packet: DecodedPacket) -> SinkResult {
        if let Some(dump) = self.dump.as_mut() {
            dump.write_packet(&packet.packet)?;
        }
        print_packet(&packet, self.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_args() -> DecodeArgs {
        DecodeArgs {
            dictionary: None,
            key_length: 16,
            tag_bytes: 1,
            ber_oid_tags: false,
            max_depth: 8,
            dump_klv: None,
        }
    }

    #[test]
    fn zero_key_length_is_usage_error() {
        let args = DecodeArgs {
            key_length: 0,
            ..decode_args()
        };
        assert_eq!(frame_config(&args).unwrap_err().code, crate::exit::USAGE);
    }

    #[test]
    fn ber_oid_flag_selects_tag_form() {
        let args = DecodeArgs {
            ber_oid_tags: true,
            ..decode_args()
        };
        assert_eq!(parser_config(&args).tag_form, TagForm::BerOid);
        assert_eq!(parser_config(&decode_args()).tag_form, TagForm::Fixed(1));
    }

    #[test]
    fn zero_width_is_usage_error() {
        let args = VideoArgs {
            width: 0,
            height: 720,
            bytes_per_pixel: 3,
            every: 60,
        };
        assert_eq!(video_format(&args).unwrap_err().code, crate::exit::USAGE);
    }

    #[test]
    fn missing_dictionary_is_empty() {
        assert!(load_dictionary(None).unwrap().is_empty());
    }
}
