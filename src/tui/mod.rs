//! Interactive terminal UI: an instance manager tab plus one output tab per
//! instance. Registry commands run on a worker thread; the UI thread only
//! reads controller state and redraws.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;

use crate::config::LauncherConfig;
use crate::monitor::InstanceManagerView;
use crate::registry::{CommandOutcome, InstanceRegistry, KillAllReport, RegistryError};
use crate::ui::{KeyValue, NoticeLevel, OutputMode, PlainRenderer, Renderer, UiError};

pub(crate) mod core;
mod events;
mod render;
mod state;
mod worker;

use events::{handle_key, EventContext, LoopControl};
use render::{render_ui, RenderContext};
use state::AppState;
use worker::CommandWorker;

const EVENT_POLL: Duration = Duration::from_millis(50);

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;

#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Ui(#[from] UiError),
    #[error("could not start the command worker: {0}")]
    Worker(#[source] io::Error),
}

pub fn run_tui(config: &LauncherConfig) -> Result<(), TuiError> {
    let registry = Arc::new(InstanceRegistry::new(config.terminal_settings()));
    let mut worker = CommandWorker::spawn(registry.clone()).map_err(TuiError::Worker)?;
    let mut manager = InstanceManagerView::new(config.poll_interval());
    let mut state = AppState::new();

    let mut terminal = init_terminal()?;
    tracing::info!("tui started");
    let loop_result = run_loop(
        &mut terminal,
        &mut state,
        &registry,
        config,
        &mut manager,
        &mut worker,
    );

    let _ = draw_shutdown_status(
        &mut terminal,
        &format!("Shutdown: stopping {} instance(s)...", registry.len()),
    );
    worker.shutdown();
    let report = registry.kill_all();
    restore_terminal(&mut terminal)?;
    loop_result?;

    render_summary(&registry, &report)?;
    tracing::info!(clean = report.is_clean(), "tui finished");
    Ok(())
}

fn init_terminal() -> Result<TuiTerminal, io::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<(), io::Error> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, EnableLineWrap)?;
    terminal.show_cursor()
}

fn run_loop(
    terminal: &mut TuiTerminal,
    state: &mut AppState,
    registry: &InstanceRegistry,
    config: &LauncherConfig,
    manager: &mut InstanceManagerView,
    worker: &mut CommandWorker,
) -> Result<(), TuiError> {
    loop {
        let now = Instant::now();
        while let Some(reply) = worker.try_reply() {
            apply_reply(state, reply);
        }
        state.sync_tabs(&registry.keys());
        manager.poll_if_due(registry, now);

        if let Some(key) = state.active_key() {
            if let Some(controller) = registry.controller(key) {
                let fresh = if state.visible.contains_key(&key) {
                    controller.poll_render(now)
                } else {
                    Some(controller.render())
                };
                if let Some(lines) = fresh {
                    state.visible.insert(key, lines);
                }
            }
        }
        state.spinner_tick = state.spinner_tick.wrapping_add(1);

        let ctx = RenderContext {
            registry,
            manager: &*manager,
            pending_commands: worker.in_flight(),
            now,
        };
        terminal.draw(|frame| render_ui(frame, state, &ctx))?;

        if !event::poll(EVENT_POLL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let mut ctx = EventContext {
                registry,
                config,
                manager: &*manager,
                worker: &mut *worker,
            };
            if let LoopControl::Quit = handle_key(state, key, &mut ctx) {
                return Ok(());
            }
        }
    }
}

fn apply_reply(state: &mut AppState, reply: Result<CommandOutcome, RegistryError>) {
    match reply {
        Ok(CommandOutcome::Created(key)) => {
            state.focus(key);
            state.set_status(format!("created {key}; press s to start"), false);
        }
        Ok(outcome) => state.set_status(outcome.describe(), false),
        Err(error) => {
            tracing::warn!("registry command failed: {error}");
            state.set_status(error.to_string(), true);
        }
    }
}

fn draw_shutdown_status(terminal: &mut TuiTerminal, status: &str) -> Result<(), io::Error> {
    terminal.draw(|frame| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(frame.area());
        let footer = Paragraph::new(status.to_owned()).style(Style::default().fg(Color::Yellow));
        frame.render_widget(footer, chunks[1]);
    })?;
    Ok(())
}

fn render_summary(registry: &InstanceRegistry, report: &KillAllReport) -> Result<(), UiError> {
    let summaries = registry.list();
    if summaries.is_empty() {
        return Ok(());
    }
    let mut renderer = PlainRenderer::stdout(OutputMode::from_env());
    renderer.section("Instance Results")?;
    let items = summaries
        .iter()
        .map(|summary| {
            let status = match &summary.last_exit {
                Some(exit) if exit.crashed => format!("crashed ({})", exit.diagnostic),
                Some(exit) => format!("stopped ({})", exit.diagnostic),
                None => "never started".to_owned(),
            };
            let detail = format!(
                "{status}, {} line(s), {} restart(s)",
                summary.line_count, summary.restarts
            );
            KeyValue::new(format!("{} #{}", summary.tool.label(), summary.index), detail)
        })
        .collect::<Vec<KeyValue>>();
    renderer.key_values(&items)?;
    for (key, failure) in &report.failures {
        renderer.notice(
            NoticeLevel::Warning,
            &format!("{key} may still be running: {failure}"),
        )?;
    }
    renderer.text("")?;
    Ok(())
}
