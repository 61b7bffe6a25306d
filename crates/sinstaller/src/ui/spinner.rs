use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Spinner on stderr around one lifecycle operation
///
/// Cleared without a trace if dropped before `succeed`/`fail`, so an early
/// `?` return never leaves a half-drawn line behind.
pub struct PlainSpinner {
    pb: ProgressBar,
    started: Instant,
    done: bool,
}

impl PlainSpinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::with_template("{spinner:.green} {msg} {elapsed:.dim}") {
            pb.set_style(template.tick_chars(TICK_CHARS));
        }
        pb.set_message(style(message).yellow().to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        Self {
            pb,
            started: Instant::now(),
            done: false,
        }
    }

    fn settle(&mut self, line: String) {
        if let Ok(plain) = ProgressStyle::with_template("{msg}") {
            self.pb.set_style(plain);
        }
        self.pb.finish_with_message(line);
        self.done = true;
    }

    /// `✓ <message> (<elapsed>)` in green
    pub fn finish_with_message(mut self, message: &str) {
        let line = format!("✓ {} ({:.1}s)", message, self.started.elapsed().as_secs_f32());
        self.settle(style(line).green().to_string());
    }

    /// `✗ <message>` in red
    pub fn fail_with_message(mut self, message: &str) {
        self.settle(style(format!("✗ {}", message)).red().to_string());
    }
}

impl Drop for PlainSpinner {
    fn drop(&mut self) {
        if !self.done {
            self.pb.finish_and_clear();
        }
    }
}
