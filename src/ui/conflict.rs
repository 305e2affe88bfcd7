//! Conflict-halt guidance.

use colored::Colorize;

use crate::git_gateway::GitGateway;

/// Tell the user exactly where a sequence stopped and how to move on.
pub fn display_conflict_halt(gateway: &GitGateway, branch: &str, onto: &str, remaining: &[String]) {
    eprintln!();
    eprintln!(
        "{} Conflicts while rebasing {} onto {}",
        "✗".red().bold(),
        branch.green(),
        onto.blue()
    );

    if let Ok(files) = gateway.conflicted_files() {
        if !files.is_empty() {
            eprintln!();
            eprintln!("Conflicted files:");
            for file in files {
                eprintln!("  {} {}", "UU".red(), file.path);
            }
        }
    }

    if !remaining.is_empty() {
        eprintln!();
        eprintln!("Still queued after {}:", branch.green());
        for name in remaining {
            eprintln!("  {} {}", "•".dimmed(), name);
        }
    }

    eprintln!();
    eprintln!("Resolve the conflicts, stage the files, then:");
    eprintln!("  {}   resume the sequence", "stackit continue".cyan());
    eprintln!("  {}      roll everything back", "stackit abort".cyan());
}
