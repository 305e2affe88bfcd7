//! In-memory forge for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

use crate::errors::StackError;

use super::types::RemotePr;
use super::Forge;

#[derive(Default)]
pub struct MockForge {
    prs: BTreeMap<String, RemotePr>,
    failing: HashSet<String>,
}

impl MockForge {
    pub fn add_pr(&mut self, branch: &str, pr: RemotePr) {
        self.prs.insert(branch.to_string(), pr);
    }

    /// Make lookups for `branch` fail, to exercise per-branch error paths.
    pub fn fail_for(&mut self, branch: &str) {
        self.failing.insert(branch.to_string());
    }
}

#[async_trait]
impl Forge for MockForge {
    fn host_name(&self) -> &'static str {
        "mock"
    }

    fn check_auth(&self) -> Result<()> {
        Ok(())
    }

    async fn pr_for_branch(&self, branch: &str) -> Result<Option<RemotePr>> {
        if self.failing.contains(branch) {
            return Err(StackError::PrHostError(format!("simulated failure for '{}'", branch)).into());
        }
        Ok(self.prs.get(branch).cloned())
    }
}
