use std::time::Duration;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Turns one raw chunk read from a pipe into a displayable line: keeps the
/// last carriage-return segment (progress bars redraw in place) and drops
/// control bytes other than SGR colour sequences.
pub fn normalize_line(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['\n', '\r']);
    let segment = trimmed
        .rsplit('\r')
        .find(|segment| !strip_ansi(segment).trim().is_empty())
        .unwrap_or(trimmed);
    sanitize_log_text(&keep_sgr_only(segment))
}

pub fn sanitize_log_text(raw: &str) -> String {
    raw.chars()
        .filter(|ch| {
            !matches!(
                ch,
                '\r'
                    | '\u{0000}'..='\u{0008}'
                    | '\u{000B}'
                    | '\u{000C}'
                    | '\u{000E}'..='\u{001A}'
                    | '\u{001C}'..='\u{001F}'
                    | '\u{007F}'
            )
        })
        .collect()
}

/// Removes every CSI and OSC escape sequence.
pub fn strip_ansi(raw: &str) -> String {
    filter_escapes(raw, false)
}

fn keep_sgr_only(raw: &str) -> String {
    filter_escapes(raw, true)
}

fn filter_escapes(raw: &str, keep_sgr: bool) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch != '\u{1b}' || i + 1 >= chars.len() {
            if ch != '\u{1b}' {
                out.push(ch);
            }
            i += 1;
            continue;
        }
        match chars[i + 1] {
            '[' => {
                let start = i;
                i += 2;
                while i < chars.len() {
                    let final_byte = chars[i];
                    if ('@'..='~').contains(&final_byte) {
                        if keep_sgr && final_byte == 'm' {
                            out.extend(chars[start..=i].iter());
                        }
                        break;
                    }
                    i += 1;
                }
            }
            ']' => {
                i += 2;
                while i < chars.len() {
                    if chars[i] == '\u{0007}' {
                        break;
                    }
                    if chars[i] == '\u{1b}' && i + 1 < chars.len() && chars[i + 1] == '\\' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            _ => {
                i += 1;
            }
        }
        i += 1;
    }
    out
}

/// Renders a line with embedded SGR codes as styled spans over `base`.
pub fn ansi_line(raw: &str, base: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut style = base;
    let mut buf = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] == '\u{1b}' && i + 1 < chars.len() && chars[i + 1] == '[' {
            if !buf.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut buf), style));
            }
            i += 2;
            let mut code = String::new();
            while i < chars.len() {
                let final_byte = chars[i];
                if ('@'..='~').contains(&final_byte) {
                    if final_byte == 'm' {
                        style = apply_sgr(style, &code, base);
                    }
                    break;
                }
                code.push(chars[i]);
                i += 1;
            }
        } else {
            buf.push(chars[i]);
        }
        i += 1;
    }
    if !buf.is_empty() {
        spans.push(Span::styled(buf, style));
    }
    if spans.is_empty() {
        return Line::from("");
    }
    Line::from(spans)
}

pub fn has_sgr(raw: &str) -> bool {
    raw.contains("\u{1b}[")
}

fn apply_sgr(current: Style, sgr: &str, base: Style) -> Style {
    let mut style = current;
    let parts = if sgr.is_empty() {
        vec!["0"]
    } else {
        sgr.split(';').collect::<Vec<&str>>()
    };
    for part in parts {
        style = match part.parse::<u8>() {
            Ok(0) => base,
            Ok(1) => style.add_modifier(Modifier::BOLD),
            Ok(2) => style.add_modifier(Modifier::DIM),
            Ok(3) => style.add_modifier(Modifier::ITALIC),
            Ok(4) => style.add_modifier(Modifier::UNDERLINED),
            Ok(22) => style.remove_modifier(Modifier::BOLD | Modifier::DIM),
            Ok(23) => style.remove_modifier(Modifier::ITALIC),
            Ok(24) => style.remove_modifier(Modifier::UNDERLINED),
            Ok(code @ 30..=37) => style.fg(basic_color(code - 30)),
            Ok(39) => style.fg(base.fg.unwrap_or(Color::Reset)),
            Ok(code @ 90..=97) => style.fg(bright_color(code - 90)),
            _ => style,
        };
    }
    style
}

fn basic_color(offset: u8) -> Color {
    match offset {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::Gray,
    }
}

fn bright_color(offset: u8) -> Color {
    match offset {
        0 => Color::DarkGray,
        1 => Color::LightRed,
        2 => Color::LightGreen,
        3 => Color::LightYellow,
        4 => Color::LightBlue,
        5 => Color::LightMagenta,
        6 => Color::LightCyan,
        _ => Color::White,
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes:02}m{secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{secs:02}s")
    } else {
        format!("{secs}s")
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_line_parses_basic_colour_sequence() {
        let line = ansi_line("\u{1b}[31merror\u{1b}[0m ok", Style::default());
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content.as_ref(), "error");
        assert_eq!(line.spans[0].style.fg, Some(Color::Red));
        assert_eq!(line.spans[1].content.as_ref(), " ok");
    }

    #[test]
    fn ansi_line_ignores_non_sgr_escape_sequences() {
        let line = ansi_line(
            "\u{1b}[2K\u{1b}[1Ahello \u{1b}[31mred\u{1b}[0m",
            Style::default(),
        );
        let rendered = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect::<String>();
        assert_eq!(rendered, "hello red");
    }

    #[test]
    fn strip_ansi_removes_csi_and_osc() {
        let raw = "\u{1b}]0;title\u{7}\u{1b}[1;32mready\u{1b}[0m";
        assert_eq!(strip_ansi(raw), "ready");
    }

    #[test]
    fn sanitize_log_text_removes_control_bytes_but_keeps_ansi() {
        let raw = "a\u{0008}b\r\u{001b}[31merr\u{001b}[0m";
        assert_eq!(sanitize_log_text(raw), "ab\u{001b}[31merr\u{001b}[0m");
    }

    #[test]
    fn normalize_line_keeps_last_progress_segment() {
        assert_eq!(normalize_line(" 10%\r 50%\r100%\r\n"), "100%");
        assert_eq!(normalize_line("done\r"), "done");
    }

    #[test]
    fn normalize_line_drops_cursor_movement_but_keeps_colour() {
        assert_eq!(
            normalize_line("\u{1b}[2K\u{1b}[32mok\u{1b}[0m\n"),
            "\u{1b}[32mok\u{1b}[0m"
        );
    }

    #[test]
    fn format_elapsed_uses_compact_human_time() {
        assert_eq!(format_elapsed(Duration::from_secs(9)), "9s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m05s");
        assert_eq!(format_elapsed(Duration::from_secs(3665)), "1h01m05s");
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
