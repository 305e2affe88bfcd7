//! PR-host abstraction.
//!
//! The core consumes a narrow interface from the code-review host: an auth
//! check and per-branch PR lookups (number, state, base, url). The GitHub
//! implementation shells out to `gh`; batch lookups fan out in parallel
//! because they are side-effect-free reads.

pub mod github;
pub mod mock;
pub mod types;

pub use github::GitHubForge;
pub use mock::MockForge;
pub use types::{PrState, RemotePr};

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::StackError;
use crate::git_gateway::GitGateway;

#[async_trait]
pub trait Forge: Send + Sync {
    /// Human-readable host name for messages ("github").
    fn host_name(&self) -> &'static str;

    /// Cheap auth probe; called before batch queries so a missing token
    /// fails once with a hint instead of per branch.
    fn check_auth(&self) -> Result<()>;

    /// The PR whose head is `branch`, if one exists (any state).
    async fn pr_for_branch(&self, branch: &str) -> Result<Option<RemotePr>>;

    /// Batch lookup. Per-branch failures are collected, not fatal: sync
    /// continues for the branches whose PR data loaded.
    async fn prs_for_branches(&self, branches: &[String]) -> BTreeMap<String, Result<Option<RemotePr>>> {
        let lookups = branches.iter().map(|branch| async move {
            let result = self.pr_for_branch(branch).await;
            (branch.clone(), result)
        });
        futures::future::join_all(lookups).await.into_iter().collect()
    }
}

/// Pick a forge implementation from the configured remote's URL.
pub fn detect(gateway: &GitGateway) -> Result<Box<dyn Forge>> {
    let remote = gateway.remote().to_string();
    if !gateway.has_remote(&remote)? {
        return Err(StackError::PrHostError(format!("remote '{}' is not configured", remote)).into());
    }
    let output = gateway.run_git_stdout(&["remote", "get-url", &remote])?;
    if output.contains("github") {
        Ok(Box::new(GitHubForge::new()))
    } else {
        Err(StackError::PrHostError(format!("unsupported PR host for remote url '{}'", output)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_lookup_collects_failures_per_branch() {
        let mut forge = MockForge::default();
        forge.add_pr(
            "good",
            RemotePr {
                number: 1,
                state: PrState::Open,
                base: "main".into(),
                url: "u".into(),
            },
        );
        forge.fail_for("flaky");

        let branches = vec!["good".to_string(), "flaky".to_string(), "no-pr".to_string()];
        let results = forge.prs_for_branches(&branches).await;

        assert!(results["good"].as_ref().unwrap().is_some());
        assert!(results["flaky"].is_err());
        assert!(results["no-pr"].as_ref().unwrap().is_none());
    }
}
