//! Worktree and index status queries.

use anyhow::Result;

use crate::errors::StackError;

use super::GitGateway;

/// A file currently carrying conflict markers.
#[derive(Debug, Clone)]
pub struct ConflictedFile {
    pub path: String,
}

impl GitGateway {
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        self.backend().has_uncommitted_changes()
    }

    pub fn has_staged_changes(&self) -> Result<bool> {
        self.backend().has_staged_changes()
    }

    pub fn has_staged_or_modified_changes(&self) -> Result<bool> {
        self.backend().has_staged_or_modified_changes()
    }

    /// Fail unless the worktree is clean enough to rebase: staged or
    /// modified tracked files block, untracked files are fine.
    pub fn require_clean_for_rebase(&self) -> Result<()> {
        if self.has_staged_or_modified_changes()? {
            return Err(StackError::UncommittedChanges.into());
        }
        Ok(())
    }

    /// Files with unresolved conflicts, for guidance output.
    pub fn conflicted_files(&self) -> Result<Vec<ConflictedFile>> {
        let output = self.run_git_stdout(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(output
            .lines()
            .filter(|l| !l.is_empty())
            .map(|path| ConflictedFile { path: path.to_string() })
            .collect())
    }
}
