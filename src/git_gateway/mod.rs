//! Typed facade over a git worktree.
//!
//! All git operations go through this gateway. It owns a `GitBackend`
//! (git2 for files-format repos, subprocess for reftable) for the primitive
//! operations and drives compound flows (rebase, stash, merges, hunk
//! parsing) through the git CLI, mirroring how git itself sequences them.
//!
//! Contract: no operation that spawns git may run while a rebase or merge is
//! in progress, except `rebase_abort` / `rebase_continue` / `merge_abort`.
//! Callers check with [`GitGateway::ensure_no_operation_in_progress`].

mod branch;
mod commit;
mod diff;
mod rebase;
mod refs;
mod remote;
mod stash;
mod status;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

#[cfg(not(test))]
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::git_backend::{self, GitBackend};

pub use self::diff::{render_patch, DiffHunk, StagedDiff};
pub use self::rebase::RebaseOutcome;
pub use self::stash::StashGuard;
pub use crate::git_backend::{ExpectedRef, Oid};

const DEFAULT_REMOTE: &str = "origin";

/// Echo a git command when `--verbose` is active.
pub(crate) fn verbose_cmd(args: &[&str]) {
    if ExecutionContext::is_verbose() {
        eprintln!("  {} git {}", "[cmd]".dimmed(), args.join(" "));
    }
}

pub struct GitGateway {
    backend: Box<dyn GitBackend>,
    pub(crate) git_dir: PathBuf,
    pub(crate) workdir: PathBuf,
    remote: String,
}

impl GitGateway {
    /// Open the repository containing the current directory.
    ///
    /// In test builds this resolves through the thread-local
    /// `TestRepoContext` so tests never touch the real working directory.
    pub fn new() -> Result<Self> {
        #[cfg(test)]
        {
            if let Some(path) = crate::test_context::test_repo_path() {
                return Self::from_path(path);
            }
            panic!(
                "GitGateway::new() called in a test without TestRepoContext.\n\
                 This would operate on the stackit repository itself. Add:\n\
                 \n\
                 let dir = tempdir()?;\n\
                 let _repo = init_test_repo(dir.path())?;\n\
                 let _ctx = TestRepoContext::new(dir.path());"
            );
        }

        #[cfg(not(test))]
        {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Self::from_path(&cwd)
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let backend = git_backend::create_backend(path)?;
        let git_dir = backend.git_dir().to_path_buf();
        let workdir = backend.workdir().to_path_buf();

        #[cfg(not(test))]
        let remote = Config::load()
            .map(|c| c.remote)
            .unwrap_or_else(|_| DEFAULT_REMOTE.to_string());
        #[cfg(test)]
        let remote = DEFAULT_REMOTE.to_string();

        Ok(Self {
            backend,
            git_dir,
            workdir,
            remote,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub(crate) fn backend(&self) -> &dyn GitBackend {
        self.backend.as_ref()
    }

    /// Resolve any commit-ish to an oid.
    pub fn rev_parse(&self, reference: &str) -> Result<Oid> {
        self.backend.resolve(reference)
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<Oid> {
        self.backend.merge_base(a, b)
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        self.backend.is_ancestor(ancestor, descendant)
    }

    pub fn commit_subject(&self, reference: &str) -> Result<String> {
        self.backend.commit_subject(reference)
    }

    /// Run a git CLI command in the worktree, returning the raw output.
    pub(crate) fn run_git(&self, args: &[&str]) -> Result<std::process::Output> {
        verbose_cmd(args);
        std::process::Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .context(format!("Failed to run git {}", args.join(" ")))
    }

    /// Run a git CLI command, mapping failure to a `GitError`.
    pub(crate) fn run_git_checked(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = self.run_git(args)?;
        if !output.status.success() {
            return Err(crate::errors::StackError::from_git_output(&args.join(" "), &output).into());
        }
        Ok(output)
    }

    pub(crate) fn run_git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}
