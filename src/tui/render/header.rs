use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::border;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Tabs};
use ratatui::Frame;

use crate::terminal::ProcessState;

use super::super::state::{AppState, Tab};
use super::RenderContext;

pub(super) fn render_tabs(
    frame: &mut Frame<'_>,
    area: ratatui::layout::Rect,
    state: &AppState,
    ctx: &RenderContext<'_>,
) {
    let titles = state
        .tabs
        .iter()
        .enumerate()
        .map(|(idx, tab)| {
            let selected = idx == state.active;
            match tab {
                Tab::Manager => {
                    let style = if selected {
                        Style::default().fg(Color::Magenta)
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Line::from(Span::styled("Instances", style))
                }
                Tab::Instance(key) => {
                    let summary = ctx.registry.controller(*key).map(|controller| controller.summary());
                    let (marker, crashed) = match summary.as_ref() {
                        Some(summary) if summary.state != ProcessState::Stopped => ("●", false),
                        Some(summary) if summary.last_exit.as_ref().is_some_and(|exit| exit.crashed) => {
                            ("✗", true)
                        }
                        _ => ("○", false),
                    };
                    let style = if crashed {
                        Style::default().fg(Color::Red)
                    } else if selected {
                        Style::default().fg(key.tool.accent())
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Line::from(Span::styled(
                        format!("{} {} #{} {marker}", key.tool.icon(), key.tool.label(), key.index),
                        style,
                    ))
                }
            }
        })
        .collect::<Vec<Line>>();

    let tabs = Tabs::new(titles)
        .select(state.active)
        .block(panel_block(Some(" LAUNCHDECK "), true, Color::Magenta))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

pub(super) fn panel_block<'a>(
    title: Option<&'a str>,
    show_version: bool,
    border_color: Color,
) -> Block<'a> {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_set(border::ROUNDED)
        .border_style(Style::default().fg(border_color));
    if let Some(title) = title {
        block = block.title_top(
            Line::from(Span::styled(
                title.to_owned(),
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ))
            .left_aligned(),
        );
    }
    if show_version {
        block = block.title_bottom(
            Line::from(Span::styled(
                format!(" v{} ", env!("CARGO_PKG_VERSION")),
                Style::default().fg(Color::LightMagenta),
            ))
            .right_aligned(),
        );
    }
    block
}
