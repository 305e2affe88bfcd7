//! Stash operations with scope-guarded restore.
//!
//! History rewriting must not run over a dirty worktree. Callers push a
//! stash through [`StashGuard`], which restores it on every exit path,
//! including panics and early `?` returns.

use anyhow::Result;

use super::GitGateway;

impl GitGateway {
    /// `git stash push --include-untracked -m <label>`.
    ///
    /// Returns false when there was nothing to stash.
    pub fn stash_push_include_untracked(&self, label: &str) -> Result<bool> {
        let output = self.run_git_checked(&["stash", "push", "--include-untracked", "-m", label])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(!stdout.contains("No local changes to save"))
    }

    pub fn stash_pop(&self) -> Result<()> {
        self.run_git_checked(&["stash", "pop"])?;
        Ok(())
    }
}

/// Restores a pushed stash when dropped.
///
/// `disarm()` skips the restore for paths that already popped explicitly.
pub struct StashGuard<'a> {
    gateway: &'a GitGateway,
    armed: bool,
}

impl<'a> StashGuard<'a> {
    /// Stash the worktree (including untracked files) under `label`.
    /// Returns None when the worktree was already clean.
    pub fn push(gateway: &'a GitGateway, label: &str) -> Result<Option<Self>> {
        if gateway.stash_push_include_untracked(label)? {
            Ok(Some(Self { gateway, armed: true }))
        } else {
            Ok(None)
        }
    }

    /// Pop the stash now and disarm the guard.
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.gateway.stash_pop()
    }

    /// Leave the stash in place (e.g. a conflict halt owns the worktree
    /// now); the caller must tell the user how to recover it.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StashGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.gateway.stash_pop() {
                eprintln!("Warning: could not restore stashed changes: {}", e);
                eprintln!("Your changes are preserved; run 'git stash pop' manually.");
            }
        }
    }
}
