//! Terminal output for streamed reports
//!
//! Prints text deltas live while a stream is loading, then optionally
//! re-renders the finished report as Markdown.

pub mod renderer;
pub mod spinner;
pub mod theme;

pub use renderer::{DeltaTracker, TerminalRenderer};
pub use spinner::WaitingSpinner;
pub use theme::Theme;
