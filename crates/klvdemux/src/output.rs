use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use klvdemux_parse::{DecodedValue, ItemValue, MetadataItem, ParseStatus};
use klvdemux_stream::{DecodedPacket, EndReason, SessionReport, WorkerReport};
use serde_json::{json, Value};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

pub fn print_packet(packet: &DecodedPacket, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", tagged("packet", packet.to_json())),
        OutputFormat::Table => {
            println!("{}", packet_heading(packet));
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TAG", "NAME", "LENGTH", "VALUE"]);
            for item in &packet.items {
                table.add_row(vec![
                    tag_label(item),
                    item.name().unwrap_or("-").to_string(),
                    item.length.to_string(),
                    render_value(item),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}", packet_heading(packet));
            print_items(&packet.items, 1);
        }
    }
}

pub fn print_session(report: &SessionReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
            println!("{}", tagged("session", body));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STREAM", "UNITS", "END", "DRAINED", "PARTIAL"])
                .add_row(worker_row(&report.video))
                .add_row(worker_row(&report.metadata));
            println!("{table}");
            if let Some(child) = report.child {
                println!("child: {}", child_summary(child.code, child.killed));
            }
        }
        OutputFormat::Pretty => {
            for worker in [&report.video, &report.metadata] {
                println!(
                    "{}: {} units, {}",
                    worker.kind,
                    worker.units,
                    end_summary(&worker.end)
                );
            }
            if let Some(child) = report.child {
                println!("child: {}", child_summary(child.code, child.killed));
            }
        }
    }
}

/// Prefix a JSON object with its record type.
pub fn tagged(kind: &str, body: Value) -> Value {
    let mut out = json!({ "type": kind });
    if let (Some(out), Value::Object(body)) = (out.as_object_mut(), body) {
        out.extend(body);
    }
    out
}

fn packet_heading(packet: &DecodedPacket) -> String {
    let mut heading = format!(
        "packet {} key={} length={} items={}",
        packet.index,
        packet.packet.key(),
        packet.packet.length().value(),
        packet.items.len()
    );
    if let ParseStatus::Partial { offset, reason } = &packet.status {
        heading.push_str(&format!(" partial@{offset} ({reason})"));
    }
    heading
}

fn print_items(items: &[MetadataItem], depth: usize) {
    let indent = "  ".repeat(depth);
    for item in items {
        let name = item.name().unwrap_or("?");
        println!("{indent}{} {name} = {}", tag_label(item), render_value(item));
        if let ItemValue::Decoded {
            value: DecodedValue::Set { items, .. },
            ..
        } = &item.value
        {
            print_items(items, depth + 1);
        }
    }
}

fn tag_label(item: &MetadataItem) -> String {
    match item.tag_number {
        Some(number) => number.to_string(),
        None => format!("0x{}", hex::encode_upper(&item.tag)),
    }
}

pub fn render_value(item: &MetadataItem) -> String {
    match &item.value {
        ItemValue::Decoded { value, .. } => match value {
            DecodedValue::Unsigned(v) => v.to_string(),
            DecodedValue::Signed(v) => v.to_string(),
            DecodedValue::Float(v) => format!("{v:.6}"),
            DecodedValue::Text(v) => format!("{v:?}"),
            DecodedValue::Bytes(v) => format!("0x{}", hex::encode_upper(v)),
            DecodedValue::Set { items, status } if status.is_complete() => {
                format!("{{{} items}}", items.len())
            }
            DecodedValue::Set { items, .. } => format!("{{{} items, partial}}", items.len()),
        },
        ItemValue::Unknown => format!("<unknown> 0x{}", hex::encode_upper(&item.raw)),
        ItemValue::Invalid { error, .. } => format!("<invalid: {error}>"),
    }
}

fn worker_row(worker: &WorkerReport) -> Vec<String> {
    vec![
        worker.kind.to_string(),
        worker.units.to_string(),
        end_summary(&worker.end),
        worker.drained.to_string(),
        worker.partial_packets.to_string(),
    ]
}

fn end_summary(end: &EndReason) -> String {
    match end {
        EndReason::Eof => "end of stream".to_string(),
        EndReason::Truncated {
            stage,
            expected,
            received,
        } => format!("truncated in {stage} ({received} of {expected} bytes)"),
        EndReason::Cancelled => "cancelled".to_string(),
        EndReason::Failed { error } => format!("failed: {error}"),
    }
}

fn child_summary(code: Option<i32>, killed: bool) -> String {
    let status = code.map_or_else(|| "signal".to_string(), |code| format!("exit {code}"));
    if killed {
        format!("{status} (killed)")
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn item(value: ItemValue) -> MetadataItem {
        MetadataItem {
            tag: Bytes::from_static(&[0x41]),
            tag_number: Some(65),
            length: 2,
            raw: Bytes::from_static(&[0x0A, 0xFF]),
            value,
        }
    }

    #[test]
    fn renders_values_for_humans() {
        assert_eq!(render_value(&item(ItemValue::Unknown)), "<unknown> 0x0AFF");
        assert_eq!(
            render_value(&item(ItemValue::Decoded {
                name: "Heading".to_string(),
                value: DecodedValue::Float(12.5),
            })),
            "12.500000"
        );
        assert_eq!(
            render_value(&item(ItemValue::Decoded {
                name: "Mission".to_string(),
                value: DecodedValue::Text("M1".to_string()),
            })),
            "\"M1\""
        );
    }

    #[test]
    fn tagged_adds_type_field() {
        let out = tagged("packet", json!({ "index": 3 }));
        assert_eq!(out["type"], "packet");
        assert_eq!(out["index"], 3);
    }

    #[test]
    fn child_summary_marks_kills() {
        assert_eq!(child_summary(Some(0), false), "exit 0");
        assert_eq!(child_summary(None, true), "signal (killed)");
    }
}
