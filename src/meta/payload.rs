//! The per-branch metadata payload.
//!
//! Serialized as UTF-8 JSON with the recognized optional keys
//! `parentBranchName`, `scope`, `prInfo` and `consolidation`. Unknown keys
//! are captured into `extra` and written back unchanged, so payloads from
//! newer versions survive a round-trip through this one.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Reserved scope value that breaks inheritance for all descendants.
pub const SCOPE_NONE: &str = "none";

/// State of the pull request attached to a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Merged => write!(f, "merged"),
            PrState::Closed => write!(f, "closed"),
        }
    }
}

/// PR bookkeeping recorded at sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub state: PrState,
    /// Base branch of the PR on the host.
    pub base: String,
    pub url: String,
    /// Branch tip at the moment the PR was last synced. Used as the
    /// preferred restack upstream while it stays an ancestor of the child.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub head_sha: Option<String>,
}

/// How a branch's scope participates in inheritance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSetting {
    /// No scope of its own; resolves through the parent chain.
    Inherit,
    /// Carries this scope and passes it to descendants.
    Explicit(String),
    /// The `"none"` sentinel: descendants see no scope.
    Broken,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One branch's persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_branch_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pr_info: Option<PrInfo>,

    /// Marks a consolidation branch (one PR carrying many branches'
    /// commits); sync deletes these alongside the individuals.
    #[serde(skip_serializing_if = "is_false", default)]
    pub consolidation: bool,

    /// Unrecognized keys, preserved verbatim for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BranchMetadata {
    pub fn with_parent(parent: &str) -> Self {
        Self {
            parent_branch_name: Some(parent.to_string()),
            ..Default::default()
        }
    }

    pub fn scope_setting(&self) -> ScopeSetting {
        match self.scope.as_deref() {
            None => ScopeSetting::Inherit,
            Some(SCOPE_NONE) => ScopeSetting::Broken,
            Some(s) => ScopeSetting::Explicit(s.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Validate a branch name read from a payload's `parentBranchName`.
///
/// Catches truncated writes and blobs that were never branch names at all.
/// Slashes are legal (generated names use them); "..", control characters
/// and ref-syntax noise are not.
pub fn validate_branch_name(name: &str, owner: &str) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!(
            "Corrupt metadata: parent for branch '{}' is empty. Run 'stackit doctor' to inspect.",
            owner
        );
    }
    if name.contains("..") || name.contains("@{") || name.starts_with('/') || name.ends_with('/') {
        anyhow::bail!(
            "Corrupt metadata: parent for branch '{}' contains ref syntax: '{}'",
            owner,
            name
        );
    }
    if name.chars().any(|c| c.is_control() || c == ' ') {
        anyhow::bail!(
            "Corrupt metadata: parent for branch '{}' contains control or space characters",
            owner
        );
    }
    if name.len() > 255 {
        anyhow::bail!("Corrupt metadata: parent for branch '{}' exceeds 255 bytes", owner);
    }
    Ok(())
}
