use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub const LOG_ENV_VAR: &str = "LAUNCHDECK_LOG";
pub const LOG_FILE_NAME: &str = "launchdeck.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to `<log_dir>/launchdeck.log`; the terminal belongs to the TUI.
    File,
    /// Prefer the log file, falling back to stderr when it cannot be opened.
    FileOrStderr,
}

/// Installs the global tracing subscriber. Returns the log file path when
/// lines go to disk. Calling this twice is harmless.
pub fn init(config: &LoggingConfig, target: LogTarget) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = config.log_dir.join(LOG_FILE_NAME);
    let file = fs::create_dir_all(&config.log_dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    });

    match (file, target) {
        (Ok(file), _) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init();
            Some(log_path)
        }
        (Err(_), LogTarget::FileOrStderr) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
        (Err(_), LogTarget::File) => None,
    }
}
