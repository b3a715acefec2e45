// Copyright © 2023-2024 Vouch.io LLC

use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::time::Duration;

const RULE_WIDTH: usize = 60;

/// User-facing status output.
///
/// Diagnostics go through `log`; this is what an operator flashing a batch of
/// boards watches. Whether to color and whether to draw progress are decided
/// by the caller. Forcing escapes onto a non-terminal is left to the binary,
/// which owns `colored`'s process-wide override.
#[derive(Debug, Clone)]
pub struct Reporter {
    color: bool,
    progress: bool,
}

impl Reporter {
    pub fn new(color: bool, progress: bool) -> Self {
        if color {
            #[cfg(windows)]
            let _ = colored::control::set_virtual_terminal(true);
        }
        Reporter { color, progress }
    }

    /// No color, no progress bars.
    pub fn plain() -> Self {
        Reporter {
            color: false,
            progress: false,
        }
    }

    pub fn info(&self, msg: impl Display) {
        self.status("ℹ️  ", Color::Blue, msg);
    }

    pub fn success(&self, msg: impl Display) {
        self.status("✅ ", Color::Green, msg);
    }

    pub fn warning(&self, msg: impl Display) {
        self.status("⚠️  ", Color::Yellow, msg);
    }

    pub fn error(&self, msg: impl Display) {
        self.status("❌ ", Color::Red, msg);
    }

    fn status(&self, marker: &str, color: Color, msg: impl Display) {
        println!("{}", self.paint(marker, color, msg));
    }

    fn paint(&self, marker: &str, color: Color, msg: impl Display) -> String {
        let line = format!("{marker}{msg}");
        if self.color {
            line.as_str().color(color).to_string()
        } else {
            line
        }
    }

    /// Verbatim text, e.g. the captured output of the flasher.
    pub fn raw(&self, text: &str) {
        let text = text.trim_end();
        if !text.is_empty() {
            println!("{text}");
        }
    }

    pub fn rule(&self) {
        println!("{}", "=".repeat(RULE_WIDTH));
    }

    /// Spinner for a step of unknown length; call `finish_and_clear` when done.
    pub fn spinner(&self, msg: String) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Byte counter for a transfer, a bar when the total is known.
    pub fn transfer(&self, total: Option<u64>) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let pb = ProgressBar::new(len);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        }
    }
}
