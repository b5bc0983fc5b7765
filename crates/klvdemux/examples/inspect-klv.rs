//! Frame a KLV stream and decode its local-set items.
//!
//! Run with:
//!   cargo run --example inspect-klv
//!
//! Without arguments a small synthetic stream is used; pass a file path to
//! inspect a captured stream instead.

use std::io::Cursor;

use bytes::BytesMut;
use klvdemux::frame::{encode_packet, FrameError, KlvFrameReader};
use klvdemux::parse::{Dictionary, ItemValue, KlvPacketParser, Rule};
use klvdemux::source::{open, ByteSource, ReadSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut dictionary = Dictionary::new();
    dictionary.register_number(2, Rule::uint("Precision Time Stamp"));
    dictionary.register_number(3, Rule::utf8("Mission ID"));
    dictionary.register_number(13, Rule::scaled_int("Sensor Latitude", -90.0, 90.0));

    match std::env::args().nth(1) {
        Some(path) => inspect(open(path)?, &dictionary),
        None => inspect(ReadSource::new(Cursor::new(synthetic_stream())), &dictionary),
    }
}

fn inspect<S: ByteSource>(
    source: S,
    dictionary: &Dictionary,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = KlvFrameReader::new(source);
    let parser = KlvPacketParser::default();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(FrameError::EndOfStream(eos)) => {
                eprintln!("[inspect] {} packets, {eos}", reader.packets_read());
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        println!("packet key={} length={}", packet.key(), packet.length().value());
        let mut items = parser.parse(&packet, dictionary);
        for item in items.by_ref() {
            match &item.value {
                ItemValue::Decoded { name, value } => println!("  {name}: {}", value.to_json()),
                ItemValue::Unknown => {
                    println!("  tag {:?}: {} raw bytes", item.tag_number, item.length)
                }
                ItemValue::Invalid { name, error } => println!("  {name}: invalid ({error})"),
            }
        }
        if !items.status().is_complete() {
            eprintln!("[inspect] packet partially decoded: {:?}", items.status());
        }
    }
}

fn synthetic_stream() -> Vec<u8> {
    let key = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00,
        0x00,
    ];
    let mut wire = BytesMut::new();
    for (second, mission) in [(1u8, "ALPHA"), (2, "BRAVO")] {
        let mut value = vec![0x02, 0x08, 0, 0, 0, 0, 0, 0, 0, second];
        value.extend_from_slice(&[0x03, mission.len() as u8]);
        value.extend_from_slice(mission.as_bytes());
        value.extend_from_slice(&[0x0D, 0x04, 0x55, 0x95, 0xB6, 0x6D]);
        encode_packet(&key, &value, &mut wire);
    }
    wire.to_vec()
}
