use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::classify::{classify, Category};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured, classified line. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub raw_text: String,
    pub stream: StreamKind,
    pub timestamp: DateTime<Local>,
    pub category: Category,
    pub severity: u8,
    pub tags: Vec<&'static str>,
}

impl OutputLine {
    pub fn capture(stream: StreamKind, raw_text: String) -> Self {
        Self::captured_at(stream, raw_text, Local::now())
    }

    pub fn captured_at(stream: StreamKind, raw_text: String, timestamp: DateTime<Local>) -> Self {
        let classification = classify(&raw_text);
        Self {
            raw_text,
            stream,
            timestamp,
            category: classification.category,
            severity: classification.severity,
            tags: classification.tags,
        }
    }
}
