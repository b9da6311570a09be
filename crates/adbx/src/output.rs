use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use adbx_frame::channel_name;
use adbx_session::Routing;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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
    channel: u16,
    channel_name: &'a str,
    routing: &'a str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

/// Print one received message.
pub fn print_message(channel: u16, routing: Routing, payload: &[u8], format: OutputFormat) {
    let routing = routing_name(routing);
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel,
                channel_name: channel_name(channel),
                routing,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "ROUTING", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    format!("{channel} ({})", channel_name(channel)),
                    routing.to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} ({}) routing={} size={} payload={}",
                channel,
                channel_name(channel),
                routing,
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

/// Result of a `send` run.
#[derive(Debug, Serialize)]
pub struct SendSummary {
    pub channel: u16,
    pub messages: usize,
    pub bytes: usize,
    pub state: String,
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "MESSAGES", "BYTES", "SESSION"])
                .add_row(vec![
                    format!("{} ({})", summary.channel, channel_name(summary.channel)),
                    summary.messages.to_string(),
                    summary.bytes.to_string(),
                    summary.state.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} message(s), {} bytes on channel {} ({}); session {}",
                summary.messages,
                summary.bytes,
                summary.channel,
                channel_name(summary.channel),
                summary.state
            );
        }
        OutputFormat::Raw => {}
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn routing_name(routing: Routing) -> &'static str {
    match routing {
        Routing::Dispatch => "dispatch",
        Routing::Buffer => "buffer",
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
