//! Terminal rendering with markdown support

use crossterm::style::{Color, Stylize};
use std::io::Write;
use termimad::crossterm::style::Color as SkinColor;
use termimad::MadSkin;

use super::theme::Theme;
use crate::metrics::MetricsSummary;

/// Tracks how much of a growing text has already been printed
#[derive(Debug, Default)]
pub struct DeltaTracker {
    printed: usize,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the part of `text` not printed yet.
    ///
    /// A text shorter than what was printed means a new stream started, so
    /// printing restarts from the beginning.
    pub fn advance<'a>(&mut self, text: &'a str) -> &'a str {
        if text.len() < self.printed || !text.is_char_boundary(self.printed) {
            self.printed = 0;
        }
        let delta = &text[self.printed..];
        self.printed = text.len();
        delta
    }

    pub fn printed(&self) -> usize {
        self.printed
    }
}

/// Writes report text to stdout and everything else to stderr
pub struct TerminalRenderer {
    theme: Theme,
    skin: MadSkin,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        let mut skin = MadSkin::default();
        skin.set_headers_fg(SkinColor::Magenta);
        skin.bold.set_fg(SkinColor::White);
        skin.inline_code.set_fg(SkinColor::Green);
        skin.code_block.set_fg(SkinColor::Green);
        Self {
            theme: Theme::default(),
            skin,
        }
    }

    /// Print newly arrived text as-is
    pub fn render_delta(&self, text: &str) {
        print!("{}", text.with(self.theme.text));
        let _ = std::io::stdout().flush();
    }

    /// Close the live output and, if the report uses Markdown, print a
    /// formatted copy below a rule
    pub fn render_report(&self, content: &str) {
        println!();
        if has_markdown_elements(content) {
            println!("{}", "\u{2500}".repeat(40).with(self.theme.muted));
            self.skin.print_text(content);
        }
    }

    pub fn render_stats(&self, summary: &MetricsSummary) {
        eprintln!();
        self.status_line("\u{2022}", &summary.to_string(), self.theme.muted);
    }

    pub fn render_system(&self, msg: &str) {
        self.status_line("\u{25b6}", msg, self.theme.notice);
    }

    pub fn render_error(&self, msg: &str) {
        self.status_line("\u{2717}", msg, self.theme.error);
    }

    pub fn render_success(&self, msg: &str) {
        self.status_line("\u{2713}", msg, self.theme.success);
    }

    pub fn render_info(&self, msg: &str) {
        eprintln!("  {}", msg.with(self.theme.muted));
    }

    fn status_line(&self, marker: &str, msg: &str, color: Color) {
        eprintln!("  {} {}", marker.with(color), msg.with(color));
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a finished report is worth re-rendering as Markdown
fn has_markdown_elements(content: &str) -> bool {
    const MARKERS: [&str; 5] = ["```", "# ", "**", "| ", "- ["];
    MARKERS.iter().any(|marker| content.contains(marker))
}
