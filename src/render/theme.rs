//! Colors for stream output

use crossterm::style::Color;

pub struct Theme {
    /// Streamed report text
    pub text: Color,
    /// Notices such as "Cancelled."
    pub notice: Color,
    pub error: Color,
    pub success: Color,
    /// Secondary output: rules, hints and the stats line
    pub muted: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            text: Color::White,
            notice: Color::DarkYellow,
            error: Color::Red,
            success: Color::Green,
            muted: Color::DarkGrey,
        }
    }
}
