//! Remote operations: fetch and trunk fast-forward.

use anyhow::Result;

use super::GitGateway;

impl GitGateway {
    pub fn has_remote(&self, remote_name: &str) -> Result<bool> {
        let output = self.run_git(&["remote", "get-url", remote_name])?;
        Ok(output.status.success())
    }

    pub fn fetch(&self) -> Result<()> {
        let remote = self.remote().to_string();
        self.run_git_checked(&["fetch", &remote, "--prune"])?;
        Ok(())
    }

    /// Fast-forward a local branch to its remote tracking ref.
    ///
    /// When the branch is checked out this merges `--ff-only`; otherwise the
    /// local ref is updated directly (`fetch remote branch:branch` refuses
    /// non-fast-forward updates by default).
    pub fn fast_forward_branch(&self, branch: &str) -> Result<()> {
        let remote = self.remote().to_string();
        let current = self.current_branch().unwrap_or_default();
        if current == branch {
            let remote_ref = format!("{}/{}", remote, branch);
            self.merge_ff_only(&remote_ref)
        } else {
            let refspec = format!("{}:{}", branch, branch);
            self.run_git_checked(&["fetch", &remote, &refspec])?;
            Ok(())
        }
    }
}
