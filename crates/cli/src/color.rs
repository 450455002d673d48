// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::IsTerminal;

use clap::builder::styling::{Ansi256Color, Color, Style, Styles};

pub mod codes {
    /// Section headers / running targets.
    pub const HEADER: u8 = 74;
    /// Successful dispositions (retcode 0).
    pub const OK: u8 = 114;
    /// Failed dispositions and overlap/maintenance warnings.
    pub const WARN: u8 = 173;
    /// Muted / secondary text: job names, timestamps.
    pub const MUTED: u8 = 245;
}

/// Priority: `NO_COLOR=1` disables, `COLOR=1` forces, otherwise a TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .header(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .literal(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::MUTED)))))
}

fn paint(code: u8, text: &str) -> String {
    if !should_colorize() {
        return text.to_string();
    }
    format!("\x1b[38;5;{code}m{text}\x1b[0m")
}

pub fn header(text: &str) -> String {
    paint(codes::HEADER, text)
}

pub fn muted(text: &str) -> String {
    paint(codes::MUTED, text)
}

/// Color a retcode green on success, amber otherwise; `None` (still
/// running) is rendered muted.
pub fn retcode(code: Option<i32>) -> String {
    match code {
        Some(0) => paint(codes::OK, "0"),
        Some(c) => paint(codes::WARN, &c.to_string()),
        None => muted("running"),
    }
}
