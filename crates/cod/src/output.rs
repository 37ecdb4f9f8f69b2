use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use cod_beanstalk::{Arg, Command};
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
struct CommandOutput<'a> {
    keyword: &'a str,
    args: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_size: Option<usize>,
}

impl<'a> From<&'a Command> for CommandOutput<'a> {
    fn from(cmd: &'a Command) -> Self {
        Self {
            keyword: &cmd.keyword,
            args: cmd
                .args
                .iter()
                .map(|arg| match arg {
                    Arg::Number(n) => serde_json::Value::from(*n),
                    Arg::Text(s) => serde_json::Value::from(s.as_str()),
                })
                .collect(),
            body: cmd.body.as_deref().map(body_preview),
            body_size: cmd.body.as_ref().map(|b| b.len()),
        }
    }
}

#[derive(Serialize)]
struct WireOutput {
    size: usize,
    wire: String,
}

/// Print decoded commands, one record per command.
pub fn print_commands(commands: &[Command], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for cmd in commands {
                println!(
                    "{}",
                    serde_json::to_string(&CommandOutput::from(cmd))
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEYWORD", "ARGS", "SIZE", "BODY"]);
            for cmd in commands {
                table.add_row(vec![
                    cmd.keyword.clone(),
                    join_args(&cmd.args),
                    cmd.body
                        .as_ref()
                        .map(|b| b.len().to_string())
                        .unwrap_or_default(),
                    cmd.body.as_deref().map(body_preview).unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for cmd in commands {
                match cmd.body.as_deref() {
                    Some(body) => println!("{cmd}: {}", body_preview(body)),
                    None => println!("{cmd}"),
                }
            }
        }
        OutputFormat::Raw => {
            for cmd in commands {
                match cmd.body.as_deref() {
                    Some(body) => print_raw(body),
                    None => println!("{cmd}"),
                }
            }
        }
    }
}

/// Print encoded wire bytes.
pub fn print_wire(wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = WireOutput {
                size: wire.len(),
                wire: escape(wire),
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
                .set_header(vec!["SIZE", "WIRE"])
                .add_row(vec![wire.len().to_string(), escape(wire)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", escape(wire)),
        OutputFormat::Raw => print_raw(wire),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn join_args(args: &[Arg]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

/// Wire bytes with CR, LF and non-printables escaped.
fn escape(wire: &[u8]) -> String {
    wire.escape_ascii().to_string()
}
