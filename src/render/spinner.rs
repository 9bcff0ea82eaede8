//! Waiting spinner shown until the first text arrives

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(80);

/// Spinner that only exists between `start` and `stop`
#[derive(Default)]
pub struct WaitingSpinner {
    bar: Option<ProgressBar>,
}

impl WaitingSpinner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, msg: &str) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner:.cyan} {msg}") {
            bar.set_style(style.tick_chars("\u{2801}\u{2803}\u{2807}\u{280f}\u{281f}\u{283f}\u{287f}\u{28ff} "));
        }
        bar.set_message(msg.to_string());
        bar.enable_steady_tick(TICK);
        self.bar = Some(bar);
    }

    /// Clear the spinner; a no-op once stopped
    pub fn stop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for WaitingSpinner {
    fn drop(&mut self) {
        self.stop();
    }
}
