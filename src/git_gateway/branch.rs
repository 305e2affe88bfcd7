//! Branch and worktree operations.

use anyhow::{Context, Result};

use super::{GitGateway, Oid};

impl GitGateway {
    pub fn current_branch(&self) -> Result<String> {
        self.backend().current_branch()
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        self.backend().branch_exists(name)
    }

    pub fn branch_tip(&self, name: &str) -> Result<Oid> {
        self.backend()
            .resolve(name)
            .context(format!("Branch '{}' not found", name))
    }

    pub fn create_branch_at(&self, name: &str, at_ref: &str) -> Result<()> {
        self.backend().create_branch_at(name, at_ref)
    }

    /// Create a branch at HEAD and switch to it, keeping the index.
    pub fn create_and_checkout_branch(&self, name: &str) -> Result<()> {
        self.run_git_checked(&["checkout", "-b", name])?;
        Ok(())
    }

    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.backend().checkout_branch(name)
    }

    /// Detach HEAD at the given commit.
    pub fn checkout_detached(&self, reference: &str) -> Result<()> {
        self.run_git_checked(&["checkout", "--detach", reference])?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.backend().delete_branch(name)
    }

    pub fn rename_branch(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.backend().rename_branch(old_name, new_name)
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.backend().list_branches()
    }

    /// Point a branch ref at a commit without touching the worktree.
    /// Creates the branch when it does not exist.
    pub fn set_branch_tip(&self, name: &str, target: &Oid) -> Result<()> {
        let refname = format!("refs/heads/{}", name);
        self.backend().update_reference(
            &refname,
            target,
            &super::ExpectedRef::Any,
            &format!("stackit: reset {} to {}", name, target.short()),
        )
    }

    pub fn reset_hard(&self, reference: &str) -> Result<()> {
        self.run_git_checked(&["reset", "--hard", reference])?;
        Ok(())
    }

    /// Move the branch tip without touching index or worktree.
    pub fn reset_soft(&self, reference: &str) -> Result<()> {
        self.run_git_checked(&["reset", "--soft", reference])?;
        Ok(())
    }

    /// Mixed reset: move tip and index, leave the worktree alone.
    pub fn reset_mixed(&self, reference: &str) -> Result<()> {
        self.run_git_checked(&["reset", reference])?;
        Ok(())
    }

    /// Commits unique to `head` over `base`, oldest first, with subjects.
    pub fn commits_between(&self, base: &str, head: &str) -> Result<Vec<(Oid, String)>> {
        let range = format!("{}..{}", base, head);
        let output = self.run_git_stdout(&["log", "--reverse", "--pretty=format:%H %s", &range])?;
        let mut commits = Vec::new();
        for line in output.lines() {
            if line.is_empty() {
                continue;
            }
            match line.split_once(' ') {
                Some((sha, subject)) => commits.push((Oid::from_str_unchecked(sha), subject.to_string())),
                None => commits.push((Oid::from_str_unchecked(line), String::new())),
            }
        }
        Ok(commits)
    }

    /// Paths changed between two commits.
    pub fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let range = format!("{}..{}", base, head);
        let output = self.run_git_stdout(&["diff", "--name-only", &range])?;
        Ok(output
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    /// Copy the given paths out of `reference` into index and worktree.
    pub fn checkout_paths_from(&self, reference: &str, paths: &[String]) -> Result<()> {
        let mut args = vec!["checkout", reference, "--"];
        args.extend(paths.iter().map(|s| s.as_str()));
        self.run_git_checked(&args)?;
        Ok(())
    }

    /// Remove paths from index and worktree (`git rm -r`).
    pub fn remove_paths(&self, paths: &[String]) -> Result<()> {
        let mut args = vec!["rm", "-r", "-q", "--"];
        args.extend(paths.iter().map(|s| s.as_str()));
        self.run_git_checked(&args)?;
        Ok(())
    }

    /// The committer's username from git config, for `{username}` expansion.
    pub fn username(&self) -> String {
        self.run_git_stdout(&["config", "user.name"])
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase().replace(' ', "-"))
            .unwrap_or_else(|| "dev".to_string())
    }
}
