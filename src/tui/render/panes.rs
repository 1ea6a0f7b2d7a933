use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState};
use ratatui::Frame;

use crate::classify::Category;
use crate::registry::InstanceKey;
use crate::terminal::text::{ansi_line, format_elapsed, has_sgr};
use crate::terminal::{FilterState, InstanceSummary, OutputLine, ProcessState, StreamKind};
use crate::tui::core::InputMode;

use super::super::state::AppState;
use super::header::panel_block;
use super::RenderContext;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub(super) fn category_style(category: Category) -> Style {
    match category {
        Category::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Category::Warning => Style::default().fg(Color::Yellow),
        Category::Success => Style::default().fg(Color::Green),
        Category::Info => Style::default().fg(Color::Cyan),
        Category::Debug => Style::default().fg(Color::DarkGray),
        Category::Command => Style::default().fg(Color::LightMagenta),
        Category::Output => Style::default(),
    }
}

fn output_line(line: &OutputLine) -> Line<'static> {
    let mut spans = vec![Span::styled(
        line.timestamp.format("%H:%M:%S ").to_string(),
        Style::default().fg(Color::DarkGray),
    )];
    if line.stream == StreamKind::Stderr {
        spans.push(Span::styled("[err] ", Style::default().fg(Color::Red)));
    }
    // Tool-provided colours win over classification colours.
    let base = if has_sgr(&line.raw_text) {
        Style::default()
    } else {
        category_style(line.category)
    };
    spans.extend(ansi_line(&line.raw_text, base).spans);
    Line::from(spans)
}

fn filter_summary(filter: &FilterState) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    if filter.errors_only {
        parts.push("errors".to_owned());
    }
    if filter.warnings_only {
        parts.push("warnings".to_owned());
    }
    if !filter.search_text.is_empty() {
        parts.push(format!("\"{}\"", filter.search_text));
    }
    if let Some(pattern) = filter.custom_pattern.as_deref().filter(|raw| !raw.is_empty()) {
        parts.push(format!("/{pattern}/"));
    }
    Some(parts.join(" + "))
}

fn meta_line(summary: &InstanceSummary, filter: &FilterState, shown: usize) -> Line<'static> {
    let muted = Style::default().fg(Color::DarkGray);
    let state_style = match summary.state {
        ProcessState::Running => Style::default().fg(Color::Green),
        ProcessState::Starting => Style::default().fg(Color::Yellow),
        ProcessState::Stopped => match &summary.last_exit {
            Some(exit) if exit.crashed => Style::default().fg(Color::Red),
            _ => muted,
        },
    };
    let mut spans = vec![Span::styled(crate::monitor::status_label(summary), state_style)];
    if let Some(pid) = summary.pid {
        spans.push(Span::styled(format!("  pid {pid}"), muted));
    }
    if let Some(uptime) = summary.uptime {
        let label = if summary.restarts == 0 {
            "started"
        } else {
            "restarted"
        };
        spans.push(Span::styled(format!("  {label}: "), Style::default().fg(Color::LightBlue)));
        spans.push(Span::styled(format!("{} ago", format_elapsed(uptime)), muted));
    }
    spans.push(Span::styled(
        format!("  lines {shown}/{}", summary.line_count),
        muted,
    ));
    if let Some(active) = filter_summary(filter) {
        spans.push(Span::styled(
            format!("  filter: {active}"),
            Style::default().fg(Color::Yellow),
        ));
    }
    Line::from(spans)
}

pub(super) fn render_output_pane(
    frame: &mut Frame<'_>,
    area: Rect,
    state: &mut AppState,
    key: InstanceKey,
    ctx: &RenderContext<'_>,
) {
    let title = format!(" {} #{} ", key.tool.label(), key.index);
    let panel = panel_block(Some(title.as_str()), false, key.tool.accent());
    let Some(controller) = ctx.registry.controller(key) else {
        let gone = Paragraph::new(Line::from(Span::styled(
            "this instance was removed",
            Style::default().fg(Color::DarkGray),
        )))
        .block(panel);
        frame.render_widget(gone, area);
        return;
    };
    let summary = controller.summary();
    let filter = controller.filter();

    let viewport = state.viewport;
    let max_offset = state.max_offset(key);
    let offset = state.scroll_mut(key).resolve(max_offset);
    let visible = state.visible.get(&key).map(Vec::as_slice).unwrap_or(&[]);

    let mut lines = Vec::with_capacity(viewport + 1);
    lines.push(meta_line(&summary, &filter, visible.len()));
    if visible.is_empty() {
        let muted = Style::default().fg(Color::DarkGray);
        let placeholder = match summary.state {
            ProcessState::Starting | ProcessState::Running if filter.is_empty() => {
                let spinner = SPINNER_FRAMES[state.spinner_tick % SPINNER_FRAMES.len()];
                Line::from(vec![
                    Span::styled(spinner.to_owned(), Style::default().fg(Color::Yellow)),
                    Span::styled(" waiting for first output...", muted),
                ])
            }
            _ if !filter.is_empty() => Line::from(Span::styled("no lines match the filter", muted)),
            _ => Line::from(Span::styled("not running; press s to start", muted)),
        };
        lines.push(placeholder);
    } else {
        lines.extend(visible.iter().skip(offset).take(viewport).map(|line| output_line(line)));
    }
    let total = visible.len();
    frame.render_widget(Paragraph::new(lines).block(panel), area);

    if total > viewport {
        let mut scrollbar_state = ScrollbarState::new(total)
            .viewport_content_length(viewport)
            .position(offset);
        frame.render_stateful_widget(
            Scrollbar::default().orientation(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

pub(super) fn render_input_pane(frame: &mut Frame<'_>, area: Rect, input_mode: InputMode, input_line: &str) {
    let (title, prompt) = match input_mode {
        InputMode::Command => {
            frame.render_widget(Paragraph::new(""), area);
            return;
        }
        InputMode::Insert => ("Input (Esc command, Enter send, Up/Down history)", "> "),
        InputMode::Search => ("Search (Enter apply, empty clears)", "/ "),
        InputMode::Pattern => ("Regex filter (Enter apply, empty clears)", "? "),
    };
    let line = Line::from(vec![
        Span::styled(prompt, Style::default().fg(Color::Yellow)),
        Span::styled(input_line.to_owned(), Style::default().fg(Color::Gray)),
        Span::styled("▏", Style::default().fg(Color::Yellow)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(panel_block(Some(title), false, Color::Magenta)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::{filter_summary, output_line};
    use crate::terminal::{FilterState, OutputLine, StreamKind};

    #[test]
    fn output_line_prefixes_time_and_stderr_marker() {
        let timestamp = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 26, 53)
            .single()
            .expect("valid timestamp");
        let line = OutputLine::captured_at(StreamKind::Stderr, "Traceback (most recent call last):".to_owned(), timestamp);
        let rendered = output_line(&line)
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect::<String>();
        assert_eq!(rendered, "09:26:53 [err] Traceback (most recent call last):");
    }

    #[test]
    fn filter_summary_lists_active_predicates() {
        assert_eq!(filter_summary(&FilterState::default()), None);
        let filter = FilterState {
            search_text: "cuda".to_owned(),
            custom_pattern: Some("^GPU".to_owned()),
            errors_only: true,
            warnings_only: false,
        };
        assert_eq!(filter_summary(&filter).as_deref(), Some("errors + \"cuda\" + /^GPU/"));
    }
}
