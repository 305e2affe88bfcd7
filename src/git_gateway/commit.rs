//! Staging and commit operations.

use anyhow::Result;
use std::process::{Command, Stdio};

use super::{verbose_cmd, GitGateway};

impl GitGateway {
    pub fn stage_all(&self) -> Result<()> {
        self.backend().stage_all()
    }

    pub fn stage_tracked(&self) -> Result<()> {
        self.backend().stage_tracked()
    }

    /// Interactive hunk staging (`git add --patch`), inheriting the
    /// terminal. Fails when the session is non-interactive.
    pub fn stage_patch_interactive(&self) -> Result<()> {
        if crate::context::non_interactive() {
            anyhow::bail!("Interactive staging is disabled in non-interactive mode");
        }
        verbose_cmd(&["add", "--patch"]);
        let status = Command::new("git")
            .args(["add", "--patch"])
            .current_dir(&self.workdir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        if !status.success() {
            anyhow::bail!("git add --patch exited with {}", status.code().unwrap_or(-1));
        }
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.backend().commit(Some(message), false, false)
    }

    pub fn amend_commit(&self, message: Option<&str>, reset_author: bool) -> Result<()> {
        self.backend().commit(message, true, reset_author)
    }

    /// Number of commits on `head` that are not on `base`.
    pub fn commit_count(&self, base: &str, head: &str) -> Result<usize> {
        let range = format!("{}..{}", base, head);
        let output = self.run_git_stdout(&["rev-list", "--count", &range])?;
        Ok(output.trim().parse().unwrap_or(0))
    }
}
