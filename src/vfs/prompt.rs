//! This module implements prompting.

use libc::{STDIN_FILENO, isatty};
use std::io::BufRead;
use std::io::Write;
use std::{fmt, io};

/// Tells whether standard input is connected to a terminal.
pub fn stdin_is_terminal() -> bool {
    unsafe { isatty(STDIN_FILENO) == 1 }
}

/// Shows a prompt and reads one line. The prompt text is printed only when
/// standard input is a terminal, so piped command scripts stay quiet.
///
/// Returns `None` when the input is exhausted.
pub fn prompt<P: fmt::Display>(prompt: P) -> Option<String> {
    if stdin_is_terminal() {
        print!("{prompt}");
        let _ = io::stdout().flush();
    }
    let input = io::stdin().lock().lines().next()?.unwrap_or(String::new());
    Some(input)
}
