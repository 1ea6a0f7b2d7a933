use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Row, Table, TableState};
use ratatui::Frame;

use crate::monitor::InstanceManagerView;
use crate::terminal::ProcessState;

use super::header::panel_block;

const COLUMN_WIDTHS: [Constraint; 7] = [
    Constraint::Length(18),
    Constraint::Length(6),
    Constraint::Min(12),
    Constraint::Length(8),
    Constraint::Length(10),
    Constraint::Length(7),
    Constraint::Length(11),
];

pub(super) fn render_manager(frame: &mut Frame<'_>, area: Rect, selected: usize, view: &InstanceManagerView) {
    let panel = panel_block(Some(" Instances "), false, Color::DarkGray);
    if view.rows().is_empty() {
        let hint = Paragraph::new(vec![
            Line::from(Span::styled(
                "No instances yet.",
                Style::default().fg(Color::Gray),
            )),
            Line::from(Span::styled(
                "Press 1-4 to create one, h for help.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .block(panel);
        frame.render_widget(hint, area);
        return;
    }

    let spec = view.table();
    let header = Row::new(spec.headers).style(
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    );
    let rows = view.rows().iter().zip(spec.rows).map(|(summary, cells)| {
        let style = match summary.state {
            ProcessState::Running => Style::default().fg(summary.tool.accent()),
            ProcessState::Starting => Style::default().fg(Color::Yellow),
            ProcessState::Stopped if summary.last_exit.as_ref().is_some_and(|exit| exit.crashed) => {
                Style::default().fg(Color::Red)
            }
            ProcessState::Stopped => Style::default().fg(Color::DarkGray),
        };
        Row::new(cells).style(style)
    });
    let table = Table::new(rows, COLUMN_WIDTHS)
        .header(header)
        .block(panel)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("› ");
    let mut table_state = TableState::default().with_selected(Some(selected));
    frame.render_stateful_widget(table, area, &mut table_state);
}
