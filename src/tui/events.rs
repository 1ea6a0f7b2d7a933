use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::config::LauncherConfig;
use crate::monitor::InstanceManagerView;
use crate::registry::{InstanceKey, InstanceRegistry, RegistryCommand};
use crate::terminal::{ExportFormat, ExportScope, TerminalController};
use crate::tool::ToolKind;
use crate::tui::core::{next_index, prev_index, InputMode};

use super::state::{AppState, Tab};
use super::worker::CommandWorker;

pub(super) enum LoopControl {
    Continue,
    Quit,
}

pub(super) struct EventContext<'a> {
    pub(super) registry: &'a InstanceRegistry,
    pub(super) config: &'a LauncherConfig,
    pub(super) manager: &'a InstanceManagerView,
    pub(super) worker: &'a mut CommandWorker,
}

pub(super) fn handle_key(state: &mut AppState, key: KeyEvent, ctx: &mut EventContext<'_>) -> LoopControl {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return LoopControl::Quit;
    }
    match state.input_mode {
        InputMode::Command => handle_command_key(state, key, ctx),
        InputMode::Insert => {
            handle_insert_key(state, key, ctx);
            LoopControl::Continue
        }
        InputMode::Search | InputMode::Pattern => {
            handle_filter_key(state, key, ctx);
            LoopControl::Continue
        }
    }
}

/// The instance a lifecycle key applies to: the active tab, or the selected
/// row on the manager tab.
fn target_key(state: &AppState, manager: &InstanceManagerView) -> Option<InstanceKey> {
    match state.active_tab() {
        Tab::Instance(key) => Some(key),
        Tab::Manager => manager
            .rows()
            .get(state.manager_selected)
            .map(|row| InstanceKey::new(row.tool, row.index)),
    }
}

fn submit(state: &mut AppState, ctx: &mut EventContext<'_>, command: RegistryCommand) {
    if !ctx.worker.submit(command) {
        state.set_status("command queue is closed", true);
    }
}

fn submit_for_target<F>(state: &mut AppState, ctx: &mut EventContext<'_>, build: F)
where
    F: FnOnce(InstanceKey) -> RegistryCommand,
{
    match target_key(state, ctx.manager) {
        Some(key) => submit(state, ctx, build(key)),
        None => state.set_status("no instance selected", true),
    }
}

fn handle_command_key(state: &mut AppState, key: KeyEvent, ctx: &mut EventContext<'_>) -> LoopControl {
    if state.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('q')) {
            state.show_help = false;
        }
        return LoopControl::Continue;
    }

    let page = state.viewport.max(1);
    match key.code {
        KeyCode::Char('q') => return LoopControl::Quit,
        KeyCode::Char('h') => state.show_help = true,
        KeyCode::Right => state.active = next_index(state.active, state.tabs.len()),
        KeyCode::Left => state.active = prev_index(state.active, state.tabs.len()),
        KeyCode::Char(digit @ '1'..='4') => {
            let slot = digit as usize - '1' as usize;
            if let Some(tool) = ToolKind::ALL.get(slot).copied() {
                submit(state, ctx, RegistryCommand::Create(tool));
            }
        }
        KeyCode::Char('s') => {
            let config = ctx.config;
            submit_for_target(state, ctx, |key| RegistryCommand::Start {
                key,
                invocation: config.invocation(key.tool),
            });
        }
        KeyCode::Char('x') => submit_for_target(state, ctx, RegistryCommand::Stop),
        KeyCode::Char('K') => {
            // The worker may be busy with a stop of this instance; cut its grace short.
            if let Some(controller) = target_key(state, ctx.manager)
                .and_then(|key| ctx.registry.controller(key))
            {
                controller.interrupt_stop();
            }
            submit_for_target(state, ctx, RegistryCommand::ForceKill);
        }
        KeyCode::Char('r') => submit_for_target(state, ctx, RegistryCommand::Restart),
        KeyCode::Char('d') => submit_for_target(state, ctx, RegistryCommand::Remove),
        KeyCode::Char('A') => submit(state, ctx, RegistryCommand::KillAll),
        KeyCode::Char('c') => {
            if let Some(controller) = active_controller(state, ctx) {
                controller.clear();
                state.set_status(format!("cleared {}", controller.label()), false);
            }
        }
        KeyCode::Char('e') => export_active(state, ctx),
        KeyCode::Char('E') => toggle_filter(state, ctx, true),
        KeyCode::Char('W') => toggle_filter(state, ctx, false),
        KeyCode::Char('/') => begin_filter_input(state, ctx, InputMode::Search),
        KeyCode::Char('?') => begin_filter_input(state, ctx, InputMode::Pattern),
        KeyCode::Char('i') => {
            if state.active_key().is_some() {
                state.input_mode = InputMode::Insert;
                state.input_line.clear();
            }
        }
        KeyCode::Enter => {
            if state.active_tab() == Tab::Manager {
                match ctx.manager.select(ctx.registry, state.manager_selected) {
                    Some(controller) => {
                        state.focus(InstanceKey::new(controller.tool(), controller.index()))
                    }
                    None => state.set_status("instance no longer exists", true),
                }
            }
        }
        KeyCode::Up => match state.active_key() {
            Some(key) => state.scroll_mut(key).scroll_up(1),
            None => state.manager_selected = state.manager_selected.saturating_sub(1),
        },
        KeyCode::Down => match state.active_key() {
            Some(key) => {
                let max = state.max_offset(key);
                state.scroll_mut(key).scroll_down(1, max);
            }
            None => {
                let last = ctx.manager.rows().len().saturating_sub(1);
                state.manager_selected = (state.manager_selected + 1).min(last);
            }
        },
        KeyCode::PageUp => {
            if let Some(key) = state.active_key() {
                state.scroll_mut(key).scroll_up(page);
            }
        }
        KeyCode::PageDown => {
            if let Some(key) = state.active_key() {
                let max = state.max_offset(key);
                state.scroll_mut(key).scroll_down(page, max);
            }
        }
        KeyCode::Home => {
            if let Some(key) = state.active_key() {
                state.scroll_mut(key).top();
            }
        }
        KeyCode::End => {
            if let Some(key) = state.active_key() {
                state.scroll_mut(key).bottom();
            }
        }
        _ => {}
    }
    LoopControl::Continue
}

fn active_controller(state: &mut AppState, ctx: &EventContext<'_>) -> Option<Arc<TerminalController>> {
    let Some(key) = state.active_key() else {
        state.set_status("open an instance tab first", true);
        return None;
    };
    let controller = ctx.registry.controller(key);
    if controller.is_none() {
        state.set_status(format!("{key} no longer exists"), true);
    }
    controller
}

fn export_active(state: &mut AppState, ctx: &EventContext<'_>) {
    let Some(controller) = active_controller(state, ctx) else {
        return;
    };
    match controller.export_to_dir(&ctx.config.export_dir(), ExportFormat::Text, ExportScope::Full) {
        Ok(path) => state.set_status(format!("exported to {}", path.display()), false),
        Err(error) => state.set_status(error.to_string(), true),
    }
}

fn toggle_filter(state: &mut AppState, ctx: &EventContext<'_>, errors: bool) {
    let Some(controller) = active_controller(state, ctx) else {
        return;
    };
    let mut enabled = false;
    controller.update_filter(|filter| {
        let flag = if errors {
            &mut filter.errors_only
        } else {
            &mut filter.warnings_only
        };
        *flag = !*flag;
        enabled = *flag;
    });
    let name = if errors { "errors only" } else { "warnings only" };
    let value = if enabled { "on" } else { "off" };
    state.set_status(format!("{name}: {value}"), false);
}

fn begin_filter_input(state: &mut AppState, ctx: &EventContext<'_>, mode: InputMode) {
    let Some(controller) = active_controller(state, ctx) else {
        return;
    };
    let filter = controller.filter();
    state.input_line = match mode {
        InputMode::Pattern => filter.custom_pattern.unwrap_or_default(),
        _ => filter.search_text,
    };
    state.input_mode = mode;
}

fn handle_filter_key(state: &mut AppState, key: KeyEvent, ctx: &mut EventContext<'_>) {
    match key.code {
        KeyCode::Esc => {
            state.input_mode = InputMode::Command;
            state.input_line.clear();
        }
        KeyCode::Backspace => {
            state.input_line.pop();
        }
        KeyCode::Char(ch) => state.input_line.push(ch),
        KeyCode::Enter => {
            let mode = state.input_mode;
            let text = std::mem::take(&mut state.input_line);
            state.input_mode = InputMode::Command;
            let Some(controller) = active_controller(state, ctx) else {
                return;
            };
            if mode == InputMode::Search {
                controller.update_filter(|filter| filter.search_text = text.clone());
                if text.is_empty() {
                    state.set_status("search cleared", false);
                } else {
                    let matches = controller.search_matches(&text).len();
                    state.set_status(format!("search \"{text}\": {matches} match(es)"), false);
                }
            } else {
                let pattern = (!text.is_empty()).then(|| text.clone());
                match controller.update_filter(|filter| filter.custom_pattern = pattern) {
                    Some(error) => state.set_status(
                        format!("invalid regex, nothing will match: {error}"),
                        true,
                    ),
                    None if text.is_empty() => state.set_status("regex filter cleared", false),
                    None => state.set_status(format!("regex filter: {text}"), false),
                }
            }
            if let Some(key) = state.active_key() {
                state.scroll_mut(key).bottom();
            }
        }
        _ => {}
    }
}

fn handle_insert_key(state: &mut AppState, key: KeyEvent, ctx: &mut EventContext<'_>) {
    match key.code {
        KeyCode::Esc => {
            state.input_mode = InputMode::Command;
            state.input_line.clear();
        }
        KeyCode::Backspace => {
            state.input_line.pop();
        }
        KeyCode::Char(ch) => state.input_line.push(ch),
        KeyCode::Up => {
            if let Some(controller) = active_controller(state, ctx) {
                if let Some(entry) = controller.history_older() {
                    state.input_line = entry;
                }
            }
        }
        KeyCode::Down => {
            if let Some(controller) = active_controller(state, ctx) {
                state.input_line = controller.history_newer().unwrap_or_default();
            }
        }
        KeyCode::Enter => {
            let Some(controller) = active_controller(state, ctx) else {
                return;
            };
            let line = std::mem::take(&mut state.input_line);
            if let Err(error) = controller.send_input(&line) {
                state.set_status(error.to_string(), true);
            }
        }
        _ => {}
    }
}
