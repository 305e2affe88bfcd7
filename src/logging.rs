//! Root logger for debug tracing.
//!
//! Normal user-facing output goes through `crate::ui`; this logger carries
//! diagnostic detail. `DEBUG=1` raises the terminal drain to debug level and
//! `STACKIT_LOG_FILE=<path>` duplicates everything into a plain-text file.

use std::fs::OpenOptions;
use std::sync::{Mutex, OnceLock};

use slog::{o, Drain, Level, Logger};

static ROOT: OnceLock<Logger> = OnceLock::new();

/// The process-wide logger. Built lazily from the environment.
pub fn logger() -> &'static Logger {
    ROOT.get_or_init(build_logger)
}

fn debug_enabled() -> bool {
    std::env::var("DEBUG")
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false)
}

fn build_logger() -> Logger {
    let level = if debug_enabled() {
        Level::Debug
    } else {
        Level::Info
    };

    let decorator = slog_term::TermDecorator::new().stderr().build();
    let term = slog_term::FullFormat::new(decorator)
        .build()
        .filter_level(level)
        .fuse();

    if let Ok(path) = std::env::var("STACKIT_LOG_FILE") {
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
            let decorator = slog_term::PlainDecorator::new(file);
            // The file drain always records debug detail, independent of DEBUG.
            let file_drain = slog_term::FullFormat::new(decorator)
                .build()
                .filter_level(Level::Debug)
                .fuse();
            let both = slog::Duplicate::new(term, file_drain).fuse();
            return Logger::root(Mutex::new(both).fuse(), o!());
        }
        eprintln!("Warning: could not open STACKIT_LOG_FILE at {path}");
    }

    Logger::root(Mutex::new(term).fuse(), o!())
}
