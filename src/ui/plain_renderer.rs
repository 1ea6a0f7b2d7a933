use std::io::{IsTerminal, Write};

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;

use crate::terminal::text::{has_sgr, strip_ansi};
use crate::terminal::{OutputLine, StreamKind};
use crate::ui::progress::{IndicatifSpinnerHandle, NoopSpinnerHandle};
use crate::ui::renderer::{Renderer, SpinnerHandle, UiResult};
use crate::ui::table::render_table;
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, OutputMode, Theme};
use crate::ui::widgets::{KeyValue, MessageBlock, NoticeLevel, TableSpec};

/// Line-oriented renderer for headless commands.
pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress_enabled: bool,
    theme: Theme,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress_enabled: false,
            theme: Theme::default(),
        }
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled || style == Style::new() {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }
}

fn color_choice(mode: OutputMode) -> ColorChoice {
    match mode {
        OutputMode::Auto => ColorChoice::Auto,
        OutputMode::Always => ColorChoice::AlwaysAnsi,
        OutputMode::Never => ColorChoice::Never,
    }
}

impl PlainRenderer<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let is_tty = std::io::stdout().is_terminal();
        let stream = AutoStream::new(std::io::stdout(), color_choice(mode));
        Self::new(stream, resolve_color_enabled(mode, is_tty))
            .with_progress_enabled(is_tty && !is_ci_environment())
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let is_tty = std::io::stderr().is_terminal();
        let stream = AutoStream::new(std::io::stderr(), color_choice(mode));
        Self::new(stream, resolve_color_enabled(mode, is_tty))
            .with_progress_enabled(is_tty && !is_ci_environment())
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn text(&mut self, body: &str) -> UiResult<()> {
        write!(self.writer, "{body}")?;
        if !body.ends_with('\n') {
            writeln!(self.writer)?;
        }
        Ok(())
    }

    fn section(&mut self, title: &str) -> UiResult<()> {
        let rendered = self.style_text(self.theme.accent, title);
        let underline = self.style_text(self.theme.muted, &"─".repeat(title.chars().count()));
        writeln!(self.writer, "{rendered}")?;
        writeln!(self.writer, "{underline}")?;
        Ok(())
    }

    fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        writeln!(self.writer, "{marker} {label}: {body}")?;
        Ok(())
    }

    fn error_block(&mut self, block: &MessageBlock) -> UiResult<()> {
        let marker = self.style_text(self.theme.error, "[error]");
        writeln!(self.writer, "{marker} {}", block.title)?;
        for line in block.body.lines() {
            writeln!(self.writer, "  {line}")?;
        }
        if let Some(hint) = &block.hint {
            let hint_label = self.style_text(self.theme.muted, "hint");
            writeln!(self.writer, "  {hint_label}: {hint}")?;
        }
        Ok(())
    }

    fn key_values(&mut self, items: &[KeyValue]) -> UiResult<()> {
        let width = items
            .iter()
            .map(|item| item.key.chars().count())
            .max()
            .unwrap_or(0);
        for item in items {
            let key = self.style_text(self.theme.label, &format!("{:<width$}", item.key));
            let value = self.style_text(self.theme.value, &item.value);
            writeln!(self.writer, "{key}  {value}")?;
        }
        Ok(())
    }

    fn table(&mut self, spec: &TableSpec) -> UiResult<()> {
        let rendered = render_table(spec);
        writeln!(self.writer, "{rendered}")?;
        Ok(())
    }

    fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>> {
        if self.progress_enabled {
            return Ok(Box::new(IndicatifSpinnerHandle::start(label)));
        }
        self.notice(NoticeLevel::Info, label)?;
        Ok(Box::new(NoopSpinnerHandle))
    }

    fn output_line(&mut self, source: &str, line: &OutputLine) -> UiResult<()> {
        let stream = match line.stream {
            StreamKind::Stdout => "out",
            StreamKind::Stderr => "err",
        };
        let prefix = self.style_text(self.theme.muted, &format!("[{source} {stream}]"));
        let body = if !self.color_enabled {
            strip_ansi(&line.raw_text)
        } else if has_sgr(&line.raw_text) {
            format!("{}{}", line.raw_text, Style::new().render_reset())
        } else {
            self.style_text(self.theme.category(line.category), &line.raw_text)
        };
        writeln!(self.writer, "{prefix} {body}")?;
        Ok(())
    }
}
