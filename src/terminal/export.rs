use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, SecondsFormat};
use serde::Serialize;

use super::line::OutputLine;
use super::text::strip_ansi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<ExportFormat> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" | "plain" => Some(ExportFormat::Text),
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Text => "text",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        })
    }
}

/// Which lines an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// Everything retained in the buffer.
    Full,
    /// Only lines matching the current filter.
    Filtered,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write export `{path}`: {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    timestamp: String,
    stream: &'a str,
    category: &'a str,
    severity: u8,
    tags: &'a [&'static str],
    text: String,
}

pub fn render_export(lines: &[Arc<OutputLine>], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Text => Ok(render_text(lines)),
        ExportFormat::Json => render_json(lines),
        ExportFormat::Csv => Ok(render_csv(lines)),
    }
}

fn render_text(lines: &[Arc<OutputLine>]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&format!(
            "[{}] [{}] [{}] {}\n",
            line.timestamp.format("%H:%M:%S%.3f"),
            line.stream,
            line.category.as_str().to_ascii_uppercase(),
            strip_ansi(&line.raw_text)
        ));
    }
    out
}

fn render_json(lines: &[Arc<OutputLine>]) -> Result<String, ExportError> {
    let records = lines
        .iter()
        .map(|line| ExportRecord {
            timestamp: line.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            stream: line.stream.as_str(),
            category: line.category.as_str(),
            severity: line.severity,
            tags: &line.tags,
            text: strip_ansi(&line.raw_text),
        })
        .collect::<Vec<ExportRecord<'_>>>();
    Ok(serde_json::to_string_pretty(&records)?)
}

fn render_csv(lines: &[Arc<OutputLine>]) -> String {
    let mut out = String::from("timestamp,stream,category,severity,tags,text\n");
    for line in lines {
        let fields = [
            line.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            line.stream.as_str().to_owned(),
            line.category.as_str().to_owned(),
            line.severity.to_string(),
            line.tags.join(";"),
            strip_ansi(&line.raw_text),
        ];
        let row = fields
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<String>>()
            .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

/// Writes `content` to `<dir>/<stem>-<timestamp>.<ext>`, creating `dir` if needed.
pub fn write_export(
    dir: &Path,
    stem: &str,
    format: ExportFormat,
    content: &str,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|error| ExportError::Write {
        path: dir.to_path_buf(),
        error,
    })?;
    let file_name = format!(
        "{}-{}.{}",
        file_stem(stem),
        Local::now().format("%Y%m%d-%H%M%S"),
        format.extension()
    );
    let path = dir.join(file_name);
    fs::write(&path, content).map_err(|error| ExportError::Write {
        path: path.clone(),
        error,
    })?;
    Ok(path)
}

fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<&str>>()
        .join("-")
}
