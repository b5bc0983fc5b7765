use klvdemux_frame::{EndOfStream, FrameError, KlvFrameReader};
use klvdemux_parse::KlvPacketParser;
use klvdemux_source::open;
use klvdemux_stream::{DecodedPacket, MetadataSink};
use serde_json::json;

use crate::cmd::common::{frame_config, load_dictionary, open_dump, parser_config, PacketPrinter};
use crate::cmd::InspectArgs;
use crate::exit::{frame_error, source_error, CliError, CliResult, STREAM_IO, SUCCESS};
use crate::output::{tagged, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = frame_config(&args.decode)?;
    let parser = KlvPacketParser::new(parser_config(&args.decode));
    let dictionary = load_dictionary(args.decode.dictionary.as_deref())?;
    let mut printer = PacketPrinter::new(format, open_dump(args.decode.dump_klv.as_deref())?);

    let source = open(&args.path).map_err(|err| source_error("open", err))?;
    let mut reader =
        KlvFrameReader::with_config(source, frame).map_err(|err| frame_error("--key-length", err))?;
    let mut partial = 0u64;

    let end = loop {
        if args.limit.is_some_and(|limit| reader.packets_read() >= limit) {
            break None;
        }
        match reader.next_packet() {
            Ok(packet) => {
                let index = reader.packets_read() - 1;
                let (items, status) = parser.parse(&packet, &dictionary).finish();
                if !status.is_complete() {
                    partial += 1;
                }
                printer
                    .on_packet(DecodedPacket {
                        index,
                        packet,
                        items,
                        status,
                    })
                    .map_err(|err| CliError::new(STREAM_IO, format!("output: {err}")))?;
            }
            Err(FrameError::EndOfStream(eos)) => break Some(eos),
            Err(err) => return Err(frame_error("read", err)),
        }
    };
    printer.finish()?;

    print_summary(reader.packets_read(), partial, end.as_ref(), format);
    Ok(SUCCESS)
}

fn print_summary(packets: u64, partial: u64, end: Option<&EndOfStream>, format: OutputFormat) {
    let end_text = match end {
        None => "limit reached".to_string(),
        Some(eos) => eos.to_string(),
    };
    match format {
        OutputFormat::Json => {
            let body = json!({
                "packets": packets,
                "partial_packets": partial,
                "truncated": end.is_some_and(|eos| !eos.is_clean()),
                "end": end_text,
            });
            println!("{}", tagged("summary", body));
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{packets} packets ({partial} partially decoded), {end_text}");
        }
    }
}
