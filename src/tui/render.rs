use std::time::Instant;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

use crate::monitor::InstanceManagerView;
use crate::registry::InstanceRegistry;
use crate::tui::core::InputMode;

use super::state::{AppState, Tab};

mod footer;
mod header;
mod help_overlay;
mod manager;
mod panes;

use footer::render_footer;
use header::render_tabs;
use help_overlay::render_help_overlay;
use manager::render_manager;
use panes::{render_input_pane, render_output_pane};

pub(super) struct RenderContext<'a> {
    pub(super) registry: &'a InstanceRegistry,
    pub(super) manager: &'a InstanceManagerView,
    pub(super) pending_commands: usize,
    pub(super) now: Instant,
}

pub(super) fn render_ui(frame: &mut Frame<'_>, state: &mut AppState, ctx: &RenderContext<'_>) {
    let input_height = if state.input_mode == InputMode::Command {
        0
    } else {
        3
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(input_height),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_tabs(frame, chunks[0], state, ctx);

    // Borders and the meta line take three rows.
    state.viewport = (chunks[1].height as usize).saturating_sub(3).max(1);
    if state.show_help {
        render_help_overlay(frame, chunks[1]);
    } else {
        match state.active_tab() {
            Tab::Manager => render_manager(frame, chunks[1], state.manager_selected, ctx.manager),
            Tab::Instance(key) => render_output_pane(frame, chunks[1], state, key, ctx),
        }
    }

    render_input_pane(frame, chunks[2], state.input_mode, &state.input_line);
    render_footer(frame, chunks[3], state, ctx);
}
