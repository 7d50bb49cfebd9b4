use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

/// Ordered field/value pairs printed as one record.
#[derive(Debug, Default)]
pub struct Report {
    fields: Vec<(&'static str, Value)>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Value::Object(map)
    }

    pub fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(&self.to_json()).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["FIELD", "VALUE"]);
                for (name, value) in &self.fields {
                    table.add_row(vec![name.to_string(), display_value(value)]);
                }
                println!("{table}");
            }
            OutputFormat::Pretty => {
                let width = self.fields.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
                for (name, value) in &self.fields {
                    println!("  {:<width$}  {}", format!("{name}:"), display_value(value), width = width + 1);
                }
            }
            OutputFormat::Raw => {
                let line = self
                    .fields
                    .iter()
                    .map(|(_, value)| display_value(value))
                    .collect::<Vec<_>>()
                    .join(" ");
                print_raw(format!("{line}\n").as_bytes());
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Lowercase hex without separators.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
