use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::header::panel_block;

fn heading(text: &'static str) -> Line<'static> {
    Line::from(vec![Span::styled(
        text,
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )])
}

pub(super) fn render_help_overlay(frame: &mut Frame<'_>, area: Rect) {
    let help_lines = vec![
        heading("Instances"),
        Line::from("1 2 3 4          new Text Generation / Companion / Local LLM / Voice Conversion"),
        Line::from("s                start the selected instance"),
        Line::from("x                stop (graceful, then forced after the grace period)"),
        Line::from("K                force kill"),
        Line::from("r                restart"),
        Line::from("d                stop and remove"),
        Line::from("A                stop every instance"),
        Line::from("enter            open the selected row (instances tab)"),
        Line::from(""),
        heading("Output"),
        Line::from("left/right       switch tabs"),
        Line::from("up/down          scroll line-by-line (instances tab: select row)"),
        Line::from("pgup/pgdn        scroll by page"),
        Line::from("home/end         jump to top/bottom (end re-enables follow)"),
        Line::from("/                search text"),
        Line::from("?                regex filter"),
        Line::from("E / W            toggle errors-only / warnings-only"),
        Line::from("c                clear the view"),
        Line::from("e                export output as text"),
        Line::from(""),
        heading("Input"),
        Line::from("i                type a line for the process (esc returns)"),
        Line::from("up/down          browse sent lines while typing"),
        Line::from(""),
        Line::from("h                toggle this help"),
        Line::from("q / ctrl+c       quit and stop every instance"),
    ];
    let help = Paragraph::new(help_lines).block(panel_block(Some("Help"), false, Color::Magenta));
    frame.render_widget(help, area);
}
