//! Typed error conditions for stack operations.
//!
//! Commands propagate `anyhow::Result` like everything else, but the
//! conditions below are constructed as concrete values so callers (and the
//! top-level exit path) can match on them with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Not inside a git repository")]
    NotInRepo,

    #[error("stackit is not initialized in this repository. Run 'stackit init' first.")]
    NotInitialized,

    #[error("Not on a branch (detached HEAD). Checkout a branch first.")]
    NotOnBranch,

    #[error("Branch '{0}' is not tracked. Run 'stackit track {0} -p <parent>' first.")]
    UntrackedBranch(String),

    #[error("Cannot {action} trunk branch '{branch}'")]
    TrunkRefusal { branch: String, action: &'static str },

    #[error("You have uncommitted changes. Commit or stash them first.")]
    UncommittedChanges,

    #[error("A rebase is already in progress. Run 'stackit continue' after resolving, or 'stackit abort'.")]
    RebaseInProgress,

    #[error("A merge is already in progress. Run 'stackit continue' after resolving, or 'stackit abort'.")]
    MergeInProgress,

    #[error("Conflicts while restacking '{0}'. Resolve them, then run 'stackit continue' (or 'stackit abort').")]
    ConflictHalt(String),

    #[error("Corrupt metadata for branch '{branch}': {detail}")]
    CorruptMeta { branch: String, detail: String },

    #[error("Parent cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("git {cmd} failed (exit {code}): {stderr}")]
    GitError {
        cmd: String,
        stderr: String,
        code: i32,
    },

    #[error("PR host error: {0}")]
    PrHostError(String),
}

impl StackError {
    /// Build a `GitError` from a finished subprocess, trimming stderr noise.
    pub fn from_git_output(cmd: &str, output: &std::process::Output) -> Self {
        StackError::GitError {
            cmd: cmd.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            code: output.status.code().unwrap_or(-1),
        }
    }
}
