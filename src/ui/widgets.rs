use std::error::Error;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Titled failure message. `body` may span several lines, one per error in a
/// source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub title: String,
    pub body: String,
    pub hint: Option<String>,
}

impl MessageBlock {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            hint: None,
        }
    }

    /// Body is the error's message followed by a `caused by:` line for each
    /// source whose text is not already part of the message above it.
    pub fn from_error(title: impl Into<String>, error: &dyn Error) -> Self {
        let mut body = error.to_string();
        let mut current = error.source();
        while let Some(source) = current {
            let text = source.to_string();
            if !body.contains(&text) {
                body.push_str("\ncaused by: ");
                body.push_str(&text);
            }
            current = source.source();
        }
        Self::new(title, body)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn path(key: impl Into<String>, path: &Path) -> Self {
        Self::new(key, path.display().to_string())
    }

    /// `fraction` in `0.0..=1.0`, shown with one decimal.
    pub fn percent(key: impl Into<String>, fraction: f64) -> Self {
        Self::new(key, format!("{:.1}%", fraction * 100.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSpec {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn with_headers(headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self::new(headers.iter().map(|header| (*header).to_owned()).collect(), rows)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{KeyValue, MessageBlock};

    #[derive(Debug, thiserror::Error)]
    #[error("could not read launcher config")]
    struct ReadFailed(#[source] io::Error);

    #[test]
    fn from_error_appends_each_new_cause() {
        let error = ReadFailed(io::Error::new(io::ErrorKind::NotFound, "launchdeck.toml missing"));
        let block = MessageBlock::from_error("launchdeck failed", &error);
        assert_eq!(
            block.body,
            "could not read launcher config\ncaused by: launchdeck.toml missing"
        );
    }

    #[test]
    fn percent_formats_fraction_with_one_decimal() {
        assert_eq!(KeyValue::percent("error rate", 1.0 / 12.0).value, "8.3%");
    }
}
