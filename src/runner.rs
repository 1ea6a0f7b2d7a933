use std::thread;
use std::time::Duration;

use crate::config::{ConfigError, LauncherConfig};
use crate::logging::{self, LogTarget};
use crate::registry::{InstanceRegistry, RegistryError};
use crate::terminal::text::format_elapsed;
use crate::terminal::{ControllerError, ExportScope, Statistics, TerminalController};
use crate::tool::ToolKind;
use crate::tui::{self, TuiError};
use crate::ui::{KeyValue, NoticeLevel, OutputMode, PlainRenderer, Renderer, TableSpec, UiError};
use crate::{print_usage, Command, RunArgs, ToolsArgs, TuiArgs};

const OUTPUT_POLL: Duration = Duration::from_millis(50);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum LaunchdeckError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ui(#[from] UiError),
    #[error(transparent)]
    Tui(#[from] TuiError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("could not install the Ctrl-C handler: {0}")]
    Signal(String),
    #[error("{label} crashed ({diagnostic})")]
    Crashed { label: String, diagnostic: String },
}

pub fn run_command(cmd: Command) -> Result<(), LaunchdeckError> {
    match cmd {
        Command::Tui(args) => run_tui(args),
        Command::Run(args) => run_tool(args),
        Command::Tools(args) => list_tools(args),
        Command::Help => {
            print_usage();
            Ok(())
        }
    }
}

fn run_tui(args: TuiArgs) -> Result<(), LaunchdeckError> {
    let config = LauncherConfig::discover(args.config.as_deref())?;
    logging::init(&config.logging, LogTarget::File);
    tui::run_tui(&config)?;
    Ok(())
}

fn list_tools(args: ToolsArgs) -> Result<(), LaunchdeckError> {
    let config = LauncherConfig::discover(args.config.as_deref())?;
    let mut renderer = PlainRenderer::stdout(OutputMode::from_env());
    renderer.section("Tools")?;
    let source = match &config.source {
        Some(path) => KeyValue::path("config", path),
        None => KeyValue::new("config", "built-in defaults"),
    };
    renderer.key_values(&[source, KeyValue::path("tools root", &config.tools_root)])?;
    renderer.text("")?;
    renderer.table(&tools_table(&config))?;
    Ok(())
}

pub(crate) fn tools_table(config: &LauncherConfig) -> TableSpec {
    let rows = ToolKind::ALL
        .into_iter()
        .map(|kind| {
            let invocation = config.invocation(kind);
            let status = if invocation.program.is_file() {
                "found"
            } else {
                "missing"
            };
            vec![
                kind.label().to_owned(),
                kind.slug().to_owned(),
                invocation.display(),
                invocation.cwd.display().to_string(),
                status.to_owned(),
            ]
        })
        .collect();
    TableSpec::with_headers(&["Tool", "Slug", "Command", "Working dir", "Script"], rows)
}

fn run_tool(args: RunArgs) -> Result<(), LaunchdeckError> {
    let config = LauncherConfig::discover(args.config.as_deref())?;
    let log_path = logging::init(&config.logging, LogTarget::FileOrStderr);
    let mut renderer = PlainRenderer::stdout(OutputMode::from_env());

    let registry = InstanceRegistry::new(config.terminal_settings());
    let key = registry.create(args.tool);
    let invocation = config.invocation(args.tool);
    renderer.section(&format!("{} #{}", args.tool.label(), key.index))?;
    let mut details = vec![
        KeyValue::new("command", invocation.display()),
        KeyValue::path("cwd", &invocation.cwd),
    ];
    if let Some(path) = log_path {
        details.push(KeyValue::path("log", &path));
    }
    renderer.key_values(&details)?;

    let spinner = renderer.spinner(&format!("starting {}", args.tool.label()))?;
    if let Err(error) = registry.start(key, invocation) {
        spinner.finish_error(&error.to_string());
        return Err(error.into());
    }
    spinner.finish_success(&format!("{key} started"));
    let controller = registry
        .controller(key)
        .ok_or(RegistryError::UnknownInstance(key))?;

    interrupt::install().map_err(LaunchdeckError::Signal)?;
    let source = key.to_string();
    let mut next_seq = 0;
    loop {
        next_seq = print_new_lines(&mut renderer, &controller, &source, next_seq)?;
        if !controller.is_running() {
            break;
        }
        if interrupt::requested() {
            renderer.notice(NoticeLevel::Warning, &format!("interrupted, stopping {key}"))?;
            registry.stop(key)?;
            break;
        }
        thread::sleep(OUTPUT_POLL);
    }
    if !controller.drain_output(DRAIN_TIMEOUT) {
        tracing::warn!(tool = %args.tool, index = key.index, "output readers still open after exit");
    }
    print_new_lines(&mut renderer, &controller, &source, next_seq)?;

    renderer.text("")?;
    renderer.section("Statistics")?;
    renderer.key_values(&statistics_items(&controller.statistics()))?;

    if let Some(format) = args.export {
        let path = controller.export_to_dir(&config.export_dir(), format, ExportScope::Full)?;
        renderer.notice(
            NoticeLevel::Success,
            &format!("exported {format} to {}", path.display()),
        )?;
    }

    match controller.last_exit() {
        Some(exit) if exit.crashed => Err(LaunchdeckError::Crashed {
            label: key.to_string(),
            diagnostic: exit.diagnostic,
        }),
        Some(exit) => {
            renderer.notice(NoticeLevel::Info, &format!("{key} exited ({})", exit.diagnostic))?;
            Ok(())
        }
        None => Ok(()),
    }
}

/// Prints every retained line from `next_seq` on and returns the sequence
/// number to resume from.
fn print_new_lines<R: Renderer>(
    renderer: &mut R,
    controller: &TerminalController,
    source: &str,
    next_seq: u64,
) -> Result<u64, UiError> {
    let mut resume = next_seq;
    for buffered in controller.lines_since(next_seq) {
        renderer.output_line(source, &buffered.line)?;
        resume = buffered.seq + 1;
    }
    Ok(resume)
}

pub(crate) fn statistics_items(stats: &Statistics) -> Vec<KeyValue> {
    let mut items = vec![
        KeyValue::new("lines", stats.total_lines.to_string()),
        KeyValue::new(
            "streams",
            format!("{} stdout / {} stderr", stats.stdout_lines, stats.stderr_lines),
        ),
    ];
    items.extend(
        stats
            .per_category
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(category, count)| KeyValue::new(category.as_str(), count.to_string())),
    );
    items.push(KeyValue::percent("error rate", stats.error_rate));
    items.push(KeyValue::percent("warning rate", stats.warning_rate));
    if let (Some(first), Some(last)) = (stats.first_timestamp, stats.last_timestamp) {
        let span = (last - first).to_std().unwrap_or_default();
        items.push(KeyValue::new("span", format_elapsed(span)));
    }
    items
}

/// SIGINT sets a flag instead of killing the launcher, so the run loop can
/// stop the child's process group and still print statistics. The child is in
/// its own group and does not see the terminal's Ctrl-C.
#[cfg(unix)]
mod interrupt {
    use std::sync::atomic::{AtomicBool, Ordering};

    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    static REQUESTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_sigint(_: nix::libc::c_int) {
        REQUESTED.store(true, Ordering::SeqCst);
    }

    pub(super) fn install() -> Result<(), String> {
        let action = SigAction::new(
            SigHandler::Handler(on_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only stores to an atomic.
        unsafe { sigaction(Signal::SIGINT, &action) }
            .map(|_| ())
            .map_err(|errno| errno.to_string())
    }

    pub(super) fn requested() -> bool {
        REQUESTED.load(Ordering::SeqCst)
    }
}

#[cfg(not(unix))]
mod interrupt {
    pub(super) fn install() -> Result<(), String> {
        Ok(())
    }

    pub(super) fn requested() -> bool {
        false
    }
}
