//! Terminal renditions of the store's interaction surfaces.

use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use keel_core::{KeelError, ProgressSurface, SaveErrorPrompt, SaveFailureChoice};
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};

/// Single status line on stderr, redrawn in place.
#[derive(Default)]
pub struct TerminalProgress {
    title: Mutex<String>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn draw(&self, line: &str) {
        let mut stderr = io::stderr();
        let _ = execute!(
            stderr,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line.dim())
        );
    }
}

impl ProgressSurface for TerminalProgress {
    fn show(&self, title: &str) {
        *self.title.lock() = title.to_string();
        self.draw(&format!("{}...", title));
    }

    fn set_text(&self, message: &str) {
        let title = self.title.lock().clone();
        self.draw(&format!("{}: {}", title, message));
    }

    fn close(&self) {
        let mut stderr = io::stderr();
        let _ = execute!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine));
    }
}

/// Asks on stdin whether a failed save should be retried.
pub struct TerminalPrompt;

impl SaveErrorPrompt for TerminalPrompt {
    fn ask(&self, title: &str, error: &KeelError) -> SaveFailureChoice {
        eprintln!("{}", title.red().bold());
        eprintln!("  {}", error);
        if let Some(hint) = retry_hint(error) {
            eprintln!("  {}", hint.dim());
        }
        eprint!("[r]etry or [c]ancel? ");
        let _ = io::stderr().flush();

        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(0) | Err(_) => SaveFailureChoice::Cancel,
            Ok(_) => parse_choice(&input),
        }
    }
}

/// Advice shown under a failed save.
pub fn retry_hint(error: &KeelError) -> Option<&'static str> {
    if error.is_transient() {
        Some("Another process may be holding the file; retrying shortly should work.")
    } else if !error.is_recoverable() {
        Some("Retrying will not help; the settings stay in memory until the next save.")
    } else {
        None
    }
}

/// Anything but an explicit retry cancels.
pub fn parse_choice(input: &str) -> SaveFailureChoice {
    match input.trim().to_lowercase().as_str() {
        "r" | "retry" | "y" | "yes" => SaveFailureChoice::Retry,
        _ => SaveFailureChoice::Cancel,
    }
}
