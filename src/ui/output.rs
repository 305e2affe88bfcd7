//! Status-line helpers. One voice for the whole CLI.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn step(msg: &str) {
    println!("{} {}", "→".blue(), msg);
}

pub fn bullet(msg: &str) {
    println!("  {} {}", "•".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn success_bold(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", "!".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Style a branch name consistently.
pub fn branch_name(name: &str) -> String {
    name.green().to_string()
}

/// Spinner for operations with network or rebase latency. Ticks on its own;
/// finish with [`spinner_success`] or [`spinner_warning`].
pub fn spinner(msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if console::Term::stderr().is_term() {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
    }
    bar.set_message(msg.to_string());
    bar
}

pub fn spinner_success(bar: ProgressBar, msg: &str) {
    bar.finish_and_clear();
    success(msg);
}

pub fn spinner_warning(bar: ProgressBar, msg: &str) {
    bar.finish_and_clear();
    warning(msg);
}
