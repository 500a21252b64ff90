use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hwlink_frame::Frame;
use hwlink_registry::MessageRegistry;
use hwlink_session::{DeviceEvent, StatsSnapshot, StopReason};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    sequence: Option<u64>,
    header_code: u16,
    message_type: &'a str,
    payload_size: usize,
    payload: serde_json::Value,
    timestamp: String,
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    endpoint: &'a str,
    stop_reason: Option<&'a StopReason>,
    stats: &'a StatsSnapshot,
}

/// Print one event received through a session listener.
pub fn print_event(event: &DeviceEvent, registry: &MessageRegistry, format: OutputFormat) {
    let payload = registry
        .encode(event.message())
        .map(|(_, bytes)| bytes)
        .unwrap_or_default();
    let out = MessageOutput {
        sequence: Some(event.sequence()),
        header_code: event.header_code(),
        message_type: event.message_name(),
        payload_size: payload.len(),
        payload: payload_value(&payload),
        timestamp: unix_seconds(event.received_at()),
    };
    print_message(&out, format);
}

/// Print one raw frame read straight off the wire.
pub fn print_frame(frame: &Frame, registry: &MessageRegistry, format: OutputFormat) {
    let out = MessageOutput {
        sequence: None,
        header_code: frame.header_code,
        message_type: registry.name_for(frame.header_code).unwrap_or("UNKNOWN"),
        payload_size: frame.payload.len(),
        payload: payload_value(frame.payload.as_ref()),
        timestamp: unix_seconds(SystemTime::now()),
    };
    print_message(&out, format);
}

fn print_message(out: &MessageOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "CODE", "TYPE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    out.sequence.map_or_else(|| "-".to_string(), |s| s.to_string()),
                    out.header_code.to_string(),
                    out.message_type.to_string(),
                    out.payload_size.to_string(),
                    out.payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let seq = out
                .sequence
                .map_or_else(String::new, |s| format!("#{s} "));
            println!(
                "{seq}{} (code={}) size={} payload={}",
                out.message_type, out.header_code, out.payload_size, out.payload
            );
        }
    }
}

/// Print why a monitor session ended and its dispatch counters (stderr).
pub fn print_summary(
    endpoint: &str,
    stop_reason: Option<&StopReason>,
    stats: &StatsSnapshot,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = SummaryOutput {
                endpoint,
                stop_reason,
                stats,
            };
            eprintln!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            let reason = match stop_reason {
                Some(StopReason::Cancelled) | None => "closed".to_string(),
                Some(StopReason::EndOfStream) => "device closed the stream".to_string(),
                Some(StopReason::Fatal(message)) => format!("failed: {message}"),
            };
            eprintln!("Session {endpoint}: {reason}");
            eprintln!("  Frames decoded:       {}", stats.frames_decoded);
            eprintln!("  Events delivered:     {}", stats.events_delivered);
            eprintln!("  Events dropped:       {}", stats.events_dropped);
            eprintln!("  Unknown header codes: {}", stats.unknown_header_codes);
            eprintln!("  Malformed payloads:   {}", stats.malformed_payloads);
            eprintln!("  Truncated frames:     {}", stats.truncated_frames);
        }
    }
}

fn payload_value(payload: &[u8]) -> serde_json::Value {
    if payload.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(value) = serde_json::from_slice(payload) {
        return value;
    }
    match std::str::from_utf8(payload) {
        Ok(text) => serde_json::Value::String(text.to_string()),
        Err(_) => serde_json::Value::String(format!("<binary {} bytes>", payload.len())),
    }
}

fn unix_seconds(at: SystemTime) -> String {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
