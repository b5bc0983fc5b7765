//! Async demux example: drive both streams on one tokio task.
//!
//! Run with:
//!   cargo run --example async-demux --features async

use bytes::{Bytes, BytesMut};
use klvdemux::frame::{encode_packet, VideoFormat};
use klvdemux::parse::{Dictionary, Rule};
use klvdemux::stream::{AsyncStreamCoordinator, CoordinatorConfig, DecodedPacket, SinkResult};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let format = VideoFormat::new(8, 4);
    let frame_size = format.frame_size()?;
    let video: Vec<u8> = (0..5u8).flat_map(|i| vec![i; frame_size]).collect();

    let mut klv = BytesMut::new();
    for i in 0..3u8 {
        encode_packet(&[0xAA; 16], &[0x02, 0x01, i], &mut klv);
    }

    let mut dictionary = Dictionary::new();
    dictionary.register_number(2, Rule::uint("Precision Time Stamp"));

    let coordinator = AsyncStreamCoordinator::new(CoordinatorConfig {
        video: format,
        ..CoordinatorConfig::default()
    });

    let mut on_frame = |index: u64, frame: Bytes| -> SinkResult {
        println!("[video] frame {index}: {} bytes", frame.len());
        Ok(())
    };
    let mut on_packet = |packet: DecodedPacket| -> SinkResult {
        println!("[klv] {}", packet.to_json());
        Ok(())
    };

    let report = coordinator
        .run(&video[..], &klv[..], &dictionary, &mut on_frame, &mut on_packet)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
