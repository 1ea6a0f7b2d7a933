pub mod classify;
pub mod config;
pub mod logging;
pub mod monitor;
pub mod process_manager;
pub mod registry;
pub mod runner;
pub mod terminal;
pub mod tool;
pub mod tui;
pub mod ui;

use std::path::PathBuf;

use terminal::ExportFormat;
use tool::ToolKind;

pub use runner::{run_command, LaunchdeckError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tui(TuiArgs),
    Run(RunArgs),
    Tools(ToolsArgs),
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuiArgs {
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub tool: ToolKind,
    pub export: Option<ExportFormat>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolsArgs {
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingConfigValue,
    MissingExportValue,
    UnknownExportFormat(String),
    MissingTool,
    UnknownTool(String),
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingConfigValue => write!(f, "--config requires a value"),
            CliParseError::MissingExportValue => write!(f, "--export requires a value"),
            CliParseError::UnknownExportFormat(raw) => {
                write!(f, "unknown export format: {raw} (expected text, json or csv)")
            }
            CliParseError::MissingTool => write!(f, "run requires a tool name"),
            CliParseError::UnknownTool(raw) => write!(f, "unknown tool: {raw}"),
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let Some(cmd) = args.peek().cloned() else {
        return Ok(Command::Tui(TuiArgs::default()));
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "tui" => {
            args.next();
            parse_tui(args)
        }
        "run" => {
            args.next();
            parse_run(args)
        }
        "tools" => {
            args.next();
            parse_tools(args)
        }
        // Bare flags such as `launchdeck --config x.toml` open the TUI.
        flag if flag.starts_with('-') => parse_tui(args),
        other => Err(CliParseError::UnknownArgument(other.to_owned())),
    }
}

fn take_config<I>(args: &mut I) -> Result<PathBuf, CliParseError>
where
    I: Iterator<Item = String>,
{
    args.next()
        .map(PathBuf::from)
        .ok_or(CliParseError::MissingConfigValue)
}

fn parse_tui<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(take_config(&mut args)?),
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::Tui(TuiArgs { config }))
}

fn parse_tools<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(take_config(&mut args)?),
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }
    Ok(Command::Tools(ToolsArgs { config }))
}

fn parse_run<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut tool = None;
    let mut export = None;
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(take_config(&mut args)?),
            "--export" => {
                let Some(raw) = args.next() else {
                    return Err(CliParseError::MissingExportValue);
                };
                let Some(format) = ExportFormat::parse(&raw) else {
                    return Err(CliParseError::UnknownExportFormat(raw));
                };
                export = Some(format);
            }
            "--help" | "-h" => return Ok(Command::Help),
            other if other.starts_with('-') || tool.is_some() => {
                return Err(CliParseError::UnknownArgument(other.to_owned()))
            }
            other => {
                let Some(kind) = ToolKind::parse(other) else {
                    return Err(CliParseError::UnknownTool(other.to_owned()));
                };
                tool = Some(kind);
            }
        }
    }
    let Some(tool) = tool else {
        return Err(CliParseError::MissingTool);
    };
    Ok(Command::Run(RunArgs {
        tool,
        export,
        config,
    }))
}

pub fn print_usage() {
    eprintln!(
        "launchdeck\n\nUSAGE:\n  launchdeck [tui] [--config <PATH>]\n  launchdeck run <tool> [--export <text|json|csv>] [--config <PATH>]\n  launchdeck tools [--config <PATH>]\n\nCOMMANDS:\n  tui               Interactive instance manager (default)\n  run <tool>        Start one instance and stream its classified output until it exits or Ctrl-C\n  tools             List the configured tools and how each one is launched\n\nTOOLS:\n  text-generation | companion | local-llm | voice-conversion  (aliases: toola..toold)\n\nOPTIONS:\n  --config <PATH>   Config file (TOML, or JSON by extension); defaults to ./launchdeck.toml or $LAUNCHDECK_CONFIG\n  --export <FMT>    After a run, write the captured output to the export directory\n\nENVIRONMENT:\n  LAUNCHDECK_LOG    Log filter (e.g. debug, launchdeck=trace)\n  LAUNCHDECK_COLOR  auto | always | never\n\nGENERAL:\n  -h, --help        Print help\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
