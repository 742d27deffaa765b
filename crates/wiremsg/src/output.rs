use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wiremsg::robot::RobotMsg;
use wiremsg_frame::{Message, MessageKind};

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
    kind: u32,
    kind_name: &'a str,
    size: u32,
    body: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_message(msg: &Message<u32>, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: msg.kind(),
                kind_name: kind_name(msg.kind()),
                size: msg.size(),
                body: body_preview(msg.body()),
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "SIZE", "PEER", "BODY"])
                .add_row(vec![
                    format!("{} ({})", msg.kind(), kind_name(msg.kind())),
                    msg.size().to_string(),
                    peer.to_string(),
                    body_preview(msg.body()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{msg} ({}) peer={} body={}",
                kind_name(msg.kind()),
                peer,
                body_preview(msg.body())
            );
        }
        OutputFormat::Raw => {
            print_raw(msg.body());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Name of the demo message kind with this code, if any.
pub fn kind_name(code: u32) -> &'static str {
    match RobotMsg::from_code(code) {
        Some(RobotMsg::ServerAccept) => "ServerAccept",
        Some(RobotMsg::ServerDeny) => "ServerDeny",
        Some(RobotMsg::ServerPing) => "ServerPing",
        Some(RobotMsg::MessageAll) => "MessageAll",
        Some(RobotMsg::ServerMessage) => "ServerMessage",
        Some(RobotMsg::ServerNewGoal) => "ServerNewGoal",
        Some(RobotMsg::ServerNewPath) => "ServerNewPath",
        Some(RobotMsg::ServerPathDone) => "ServerPathDone",
        Some(RobotMsg::ServerCharge) => "ServerCharge",
        Some(RobotMsg::RobotGoalRequest) => "RobotGoalRequest",
        Some(RobotMsg::RobotLowBattery) => "RobotLowBattery",
        Some(RobotMsg::RobotPathRequest) => "RobotPathRequest",
        Some(RobotMsg::RobotPathDone) => "RobotPathDone",
        None => "USER",
    }
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
