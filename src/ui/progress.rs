use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::renderer::SpinnerHandle;

const SPINNER_TICK: Duration = Duration::from_millis(80);
const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"];

/// Used when stdout is not a terminal; the renderer prints a notice instead.
#[derive(Debug, Default)]
pub struct NoopSpinnerHandle;

impl SpinnerHandle for NoopSpinnerHandle {
    fn set_message(&self, _message: &str) {}

    fn finish_success(&self, _message: &str) {}

    fn finish_error(&self, _message: &str) {}
}

#[derive(Debug, Clone)]
pub struct IndicatifSpinnerHandle {
    progress: ProgressBar,
}

impl IndicatifSpinnerHandle {
    pub fn start(label: &str) -> Self {
        let progress = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            progress.set_style(style.tick_strings(SPINNER_FRAMES));
        }
        progress.set_message(label.to_owned());
        progress.enable_steady_tick(SPINNER_TICK);
        Self { progress }
    }
}

impl SpinnerHandle for IndicatifSpinnerHandle {
    fn set_message(&self, message: &str) {
        self.progress.set_message(message.to_owned());
    }

    fn finish_success(&self, message: &str) {
        self.progress.finish_with_message(message.to_owned());
    }

    fn finish_error(&self, message: &str) {
        // Abandoning keeps the last frame visible instead of the final tick string.
        self.progress.abandon_with_message(format!("✗ {message}"));
    }
}
