//! Interactive stdin prompts.
//!
//! The run loop pauses at human decision points (rescan invalid files, resume
//! after a credential refresh). These block the calling thread; call them via
//! `tokio::task::block_in_place` from async code.

use std::io::{self, BufRead, Write};

/// Asks a yes/no question on stdout and reads the answer from stdin.
///
/// An empty answer returns `default`. When `assume_default` is set the
/// question is logged but not asked, for non-interactive runs.
pub fn confirm(question: &str, default: bool, assume_default: bool) -> bool {
    if assume_default {
        log::info!("{} -> {} (assumed)", question, if default { "yes" } else { "no" });
        return default;
    }

    let hint = if default { "[Y/n]" } else { "[y/N]" };
    print!("{question} {hint} ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return default;
    }
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Asks a free-form question and returns the trimmed answer. Returns an
/// empty string on EOF or a read error.
pub fn ask(question: &str) -> String {
    print!("{question} ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return String::new();
    }
    answer.trim().to_string()
}

/// Blocks until the user presses Enter.
pub fn wait_for_enter(message: &str) {
    print!("{message}");
    let _ = io::stdout().flush();
    let mut sink = String::new();
    let _ = io::stdin().lock().read_line(&mut sink);
}
