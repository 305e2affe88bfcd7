//! Rebase and merge operations.
//!
//! git2 has no porcelain-equivalent rebase, so these shell out. A rebase
//! that stops on conflicts is a normal outcome here, not an error; callers
//! decide whether to persist a continuation or abort.

use anyhow::Result;
use std::process::Stdio;

use crate::errors::StackError;

use super::{GitGateway, Oid};

/// Outcome of a rebase or merge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    Completed,
    /// Stopped on conflicts; git is mid-rebase and the worktree has markers.
    Conflicts,
}

impl RebaseOutcome {
    pub fn has_conflicts(&self) -> bool {
        matches!(self, RebaseOutcome::Conflicts)
    }
}

impl GitGateway {
    /// `git rebase --onto <onto> <upstream> <branch>`: replay the commits of
    /// `branch` that are not in `upstream` onto `onto`.
    pub fn rebase_onto(&self, upstream: &str, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        self.ensure_no_operation_in_progress()?;
        let output = self.run_git(&["rebase", "--onto", onto, upstream, branch])?;
        if output.status.success() {
            return Ok(RebaseOutcome::Completed);
        }
        if self.rebase_in_progress()? {
            return Ok(RebaseOutcome::Conflicts);
        }
        Err(StackError::from_git_output("rebase --onto", &output).into())
    }

    pub fn rebase_abort(&self) -> Result<()> {
        self.run_git_checked(&["rebase", "--abort"])?;
        Ok(())
    }

    /// Continue a conflicted rebase. `GIT_EDITOR=true` suppresses the
    /// message editor; stdin is closed so nothing can block.
    pub fn rebase_continue(&self) -> Result<RebaseOutcome> {
        super::verbose_cmd(&["rebase", "--continue"]);
        let output = std::process::Command::new("git")
            .args(["rebase", "--continue"])
            .env("GIT_EDITOR", "true")
            .stdin(Stdio::null())
            .current_dir(&self.workdir)
            .output()?;
        if output.status.success() {
            Ok(RebaseOutcome::Completed)
        } else {
            Ok(RebaseOutcome::Conflicts)
        }
    }

    pub fn rebase_in_progress(&self) -> Result<bool> {
        Ok(self.git_dir.join("rebase-merge").exists() || self.git_dir.join("rebase-apply").exists())
    }

    pub fn merge_in_progress(&self) -> Result<bool> {
        Ok(self.git_dir.join("MERGE_HEAD").exists())
    }

    /// Refuse to start new git work while a rebase or merge is underway.
    pub fn ensure_no_operation_in_progress(&self) -> Result<()> {
        if self.rebase_in_progress()? {
            return Err(StackError::RebaseInProgress.into());
        }
        if self.merge_in_progress()? {
            return Err(StackError::MergeInProgress.into());
        }
        Ok(())
    }

    /// Fast-forward-only merge of `reference` into the current branch.
    pub fn merge_ff_only(&self, reference: &str) -> Result<()> {
        self.run_git_checked(&["merge", "--ff-only", reference])?;
        Ok(())
    }

    /// Real merge without opening an editor.
    pub fn merge_no_edit(&self, reference: &str) -> Result<RebaseOutcome> {
        self.ensure_no_operation_in_progress()?;
        let output = self.run_git(&["merge", "--no-edit", reference])?;
        if output.status.success() {
            return Ok(RebaseOutcome::Completed);
        }
        if self.merge_in_progress()? {
            return Ok(RebaseOutcome::Conflicts);
        }
        Err(StackError::from_git_output("merge", &output).into())
    }

    pub fn merge_abort(&self) -> Result<()> {
        self.run_git_checked(&["merge", "--abort"])?;
        Ok(())
    }

    /// True when `base` is already an ancestor of `branch` (nothing to do).
    pub fn is_branch_based_on(&self, branch: &str, base: &str) -> Result<bool> {
        self.backend().is_ancestor(base, branch)
    }

    /// Reflog-aware fork point of `branch` relative to `parent`
    /// (`git merge-base --fork-point`). The parent's reflog still knows the
    /// old tip after an amend or rebase rewrote its history, so this finds
    /// the commit the branch actually forked from where a plain merge base
    /// would fall back to a much older ancestor. `None` when the reflog has
    /// no answer.
    pub fn merge_base_fork_point(&self, parent: &str, branch: &str) -> Result<Option<Oid>> {
        let output = self.run_git(&["merge-base", "--fork-point", parent, branch])?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Oid::from_str_unchecked(&sha)))
        }
    }
}
