use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::super::state::AppState;
use super::RenderContext;

pub(super) fn render_footer(
    frame: &mut Frame<'_>,
    area: ratatui::layout::Rect,
    state: &AppState,
    ctx: &RenderContext<'_>,
) {
    let muted = Style::default().fg(Color::DarkGray);
    let active = Style::default().fg(Color::Yellow);

    if let Some(status) = state.current_status(ctx.now) {
        let style = if status.is_error {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Green)
        };
        frame.render_widget(Paragraph::new(Line::from(Span::styled(status.text.clone(), style))), area);
        return;
    }

    let mut spans = vec![
        Span::styled(
            format!("mode:{}", state.input_mode.label()),
            if state.input_mode == crate::tui::core::InputMode::Command {
                muted
            } else {
                active
            },
        ),
        Span::styled("  |  ", muted),
        Span::styled("help (h)", if state.show_help { active } else { muted }),
        Span::styled("  |  ", muted),
        Span::styled("new (1-4)", muted),
        Span::styled("  |  ", muted),
        Span::styled("quit (q)", muted),
    ];
    if ctx.pending_commands > 0 {
        spans.push(Span::styled("  |  ", muted));
        spans.push(Span::styled(format!("working ({})...", ctx.pending_commands), active));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
