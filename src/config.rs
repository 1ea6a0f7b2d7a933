use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::process_manager::InvocationDescriptor;
use crate::tool::ToolKind;

pub const DEFAULT_CONFIG_FILE: &str = "launchdeck.toml";
pub const CONFIG_ENV_VAR: &str = "LAUNCHDECK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {error}")]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to parse config `{path}`: {detail}")]
    Parse { path: PathBuf, detail: String },
    #[error("config `{path}` names unknown tool `{tool}`")]
    UnknownTool { path: PathBuf, tool: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ToolEntry {
    pub script: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub max_buffer_size: usize,
    pub max_history: usize,
    pub render_interval_ms: u64,
    pub stop_grace_ms: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 10_000,
            max_history: 100,
            render_interval_ms: 100,
            stop_grace_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            export_dir: PathBuf::from("exports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip)]
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    tools_root: Option<PathBuf>,
    tools: BTreeMap<String, ToolEntry>,
    terminal: TerminalConfig,
    monitor: MonitorConfig,
    paths: PathsConfig,
    logging: LoggingConfig,
}

/// Tunables shared by every terminal controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSettings {
    pub max_buffer_size: usize,
    pub max_history: usize,
    pub render_interval: Duration,
    pub stop_grace: Duration,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        TerminalSettings::from(&TerminalConfig::default())
    }
}

impl From<&TerminalConfig> for TerminalSettings {
    fn from(value: &TerminalConfig) -> Self {
        Self {
            max_buffer_size: value.max_buffer_size.max(1),
            max_history: value.max_history.max(1),
            render_interval: Duration::from_millis(value.render_interval_ms),
            stop_grace: Duration::from_millis(value.stop_grace_ms),
        }
    }
}

/// Fully resolved launcher configuration, passed by reference to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    pub source: Option<PathBuf>,
    pub tools_root: PathBuf,
    pub tools: BTreeMap<ToolKind, ToolEntry>,
    pub terminal: TerminalConfig,
    pub monitor: MonitorConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let tools_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_root(tools_root)
    }
}

impl LauncherConfig {
    pub fn with_root(tools_root: PathBuf) -> Self {
        let mut config = Self {
            source: None,
            tools_root,
            tools: BTreeMap::new(),
            terminal: TerminalConfig::default(),
            monitor: MonitorConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.logging.log_dir = config.log_dir();
        config
    }

    /// Resolves the config path from an explicit override, `LAUNCHDECK_CONFIG`,
    /// or `launchdeck.toml` in the current directory. A missing default file
    /// yields the built-in defaults.
    pub fn discover(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = override_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        match explicit {
            Some(path) => Self::load(&path),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::load(&fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw_text = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let raw: RawConfig = if is_json {
            serde_json::from_str(&raw_text).map_err(|error| ConfigError::Parse {
                path: path.to_path_buf(),
                detail: error.to_string(),
            })?
        } else {
            toml::from_str(&raw_text).map_err(|error| ConfigError::Parse {
                path: path.to_path_buf(),
                detail: error.to_string(),
            })?
        };

        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_raw(raw, base_dir, path)
    }

    pub fn parse_toml(source: &str, base_dir: PathBuf) -> Result<Self, ConfigError> {
        let pseudo_path = base_dir.join(DEFAULT_CONFIG_FILE);
        let raw: RawConfig = toml::from_str(source).map_err(|error| ConfigError::Parse {
            path: pseudo_path.clone(),
            detail: error.to_string(),
        })?;
        Self::from_raw(raw, base_dir, &pseudo_path)
    }

    fn from_raw(raw: RawConfig, base_dir: PathBuf, path: &Path) -> Result<Self, ConfigError> {
        let tools_root = match raw.tools_root {
            Some(root) if root.is_absolute() => root,
            Some(root) => base_dir.join(root),
            None => base_dir,
        };
        let mut tools = BTreeMap::new();
        for (name, entry) in raw.tools {
            let Some(kind) = ToolKind::parse(&name) else {
                return Err(ConfigError::UnknownTool {
                    path: path.to_path_buf(),
                    tool: name,
                });
            };
            tools.insert(kind, entry);
        }
        let mut config = Self {
            source: Some(path.to_path_buf()),
            tools_root,
            tools,
            terminal: raw.terminal,
            monitor: raw.monitor,
            paths: raw.paths,
            logging: raw.logging,
        };
        config.logging.log_dir = config.log_dir();
        Ok(config)
    }

    pub fn terminal_settings(&self) -> TerminalSettings {
        TerminalSettings::from(&self.terminal)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms.max(1))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.paths.log_dir)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.resolve(&self.paths.export_dir)
    }

    pub fn invocation(&self, kind: ToolKind) -> InvocationDescriptor {
        let entry = self.tools.get(&kind).cloned().unwrap_or_default();
        let script = entry
            .script
            .map(|script| self.resolve(&script))
            .unwrap_or_else(|| self.tools_root.join(kind.default_script()));
        let cwd = entry
            .cwd
            .map(|cwd| self.resolve(&cwd))
            .or_else(|| script.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.tools_root.clone());
        InvocationDescriptor {
            program: script,
            args: entry.args,
            cwd,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.tools_root.join(path)
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
