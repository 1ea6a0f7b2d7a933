use anstyle::{AnsiColor, Color, Style};

use crate::classify::Category;

pub const COLOR_ENV_VAR: &str = "LAUNCHDECK_COLOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(COLOR_ENV_VAR).ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("always") => OutputMode::Always,
            Some("never") => OutputMode::Never,
            _ => OutputMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub accent: Style,
    pub muted: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub label: Style,
    pub value: Style,
    pub info: Style,
    pub debug: Style,
    pub command: Style,
}

fn fg(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: fg(AnsiColor::Cyan).bold(),
            muted: fg(AnsiColor::BrightBlack),
            success: fg(AnsiColor::Green).bold(),
            warning: fg(AnsiColor::Yellow).bold(),
            error: fg(AnsiColor::Red).bold(),
            label: fg(AnsiColor::Blue).bold(),
            value: fg(AnsiColor::White),
            info: fg(AnsiColor::Cyan),
            debug: fg(AnsiColor::BrightBlack),
            command: fg(AnsiColor::Magenta),
        }
    }
}

impl Theme {
    /// Style for an output line of the given category; plain output is unstyled.
    pub fn category(&self, category: Category) -> Style {
        match category {
            Category::Error => self.error,
            Category::Warning => self.warning,
            Category::Success => self.success,
            Category::Info => self.info,
            Category::Debug => self.debug,
            Category::Command => self.command,
            Category::Output => Style::new(),
        }
    }
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

pub fn is_ci_environment() -> bool {
    std::env::var_os("CI").is_some()
}
