//! Line-oriented console reporter.
//!
//! On a terminal, download progress is redrawn in place on one line; when
//! output is piped only the final status lines are written.

use std::io::{self, Stdout, Write};
use std::path::Path;
use std::sync::Mutex;

use binman_core::Reporter;
use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;

use super::theme::{Theme, format_progress};

/// [`Reporter`] that prints to stdout (progress) and stderr (problems).
#[derive(Debug)]
pub struct ConsoleReporter {
    theme: Theme,
    interactive: bool,
    /// A progress line is on screen and must be cleared before the next write.
    progress_shown: Mutex<bool>,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            interactive: io::stdout().is_tty(),
            progress_shown: Mutex::new(false),
        }
    }

    fn clear_progress(&self, out: &mut Stdout) {
        let Ok(mut shown) = self.progress_shown.lock() else {
            return;
        };
        if *shown {
            let _ = out.queue(MoveToColumn(0));
            let _ = out.queue(Clear(ClearType::CurrentLine));
            *shown = false;
        }
    }

    fn line(&self, text: &str) {
        let mut out = io::stdout();
        self.clear_progress(&mut out);
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    fn problem(&self, text: &str) {
        let mut out = io::stdout();
        self.clear_progress(&mut out);
        let _ = out.flush();
        eprintln!("{text}");
    }

    fn entry_line(&self, icon: &str, name: &str, version: &str, detail: &str) -> String {
        let colors = &self.theme.colors;
        format!(
            "  {icon} {} {} {}",
            format!("{name: <16}").with(colors.name),
            format!("{version: <12}").with(colors.version),
            detail.with(colors.secondary)
        )
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.line("");
        self.line(&title.with(self.theme.colors.header).bold().to_string());
    }

    fn resolved(&self, name: &str, version: &str, url: &str) {
        tracing::debug!(name, version, url, "resolved URL");
    }

    fn downloading(&self, name: &str, version: &str, current: u64, total: Option<u64>) {
        if !self.interactive {
            return;
        }
        let icon = self.theme.icons.active.with(self.theme.colors.active).to_string();
        let text = self.entry_line(&icon, name, version, &format_progress(current, total));

        let mut out = io::stdout();
        let _ = out.queue(MoveToColumn(0));
        let _ = out.queue(Clear(ClearType::CurrentLine));
        let _ = write!(out, "{text}");
        let _ = out.flush();
        if let Ok(mut shown) = self.progress_shown.lock() {
            *shown = true;
        }
    }

    fn extracting(&self, name: &str, version: &str, format: &str) {
        tracing::debug!(name, version, format, "extracting");
    }

    fn installing(&self, name: &str, version: &str, dest: &Path) {
        tracing::debug!(name, version, dest = %dest.display(), "installing");
    }

    fn done(&self, name: &str, version: &str, detail: &str) {
        let icon = self.theme.icons.success.with(self.theme.colors.success).to_string();
        self.line(&self.entry_line(&icon, name, version, detail));
    }

    fn failed(&self, name: &str, version: &str, reason: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error).to_string();
        self.problem(&self.entry_line(&icon, name, version, reason));
    }

    fn info(&self, msg: &str) {
        let icon = self.theme.icons.info.with(self.theme.colors.secondary);
        self.line(&format!("{icon} {msg}"));
    }

    fn success(&self, msg: &str) {
        let icon = self.theme.icons.success.with(self.theme.colors.success);
        self.line(&format!("{icon} {msg}"));
    }

    fn warning(&self, msg: &str) {
        let icon = self.theme.icons.warning.with(self.theme.colors.warning);
        self.problem(&format!("{icon} {msg}"));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        let noun = if count == 1 { "binary" } else { "binaries" };
        self.line("");
        self.line(
            &format!("{count} {noun} {action} in {elapsed_secs:.1}s")
                .with(self.theme.colors.secondary)
                .to_string(),
        );
    }
}
