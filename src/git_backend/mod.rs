//! Low-level git backend abstraction.
//!
//! libgit2 does not support the reftable ref format (git 2.45+), so every
//! primitive operation goes through the `GitBackend` trait with two
//! implementations:
//!
//! - `Git2Backend` (libgit2) for "files"-format repositories
//! - `SubprocessBackend` (git CLI) for any format, including reftable
//!
//! Higher-level compound operations (rebase, stash, hunk parsing) live on
//! `GitGateway`, which owns a `Box<dyn GitBackend>` and picks the
//! implementation at open time. Code outside `git_gateway` should not touch
//! this module directly.

mod git2_backend;
mod subprocess_backend;

pub use git2_backend::Git2Backend;
pub use subprocess_backend::SubprocessBackend;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Git ref storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFormat {
    /// Loose refs + packed-refs
    Files,
    /// Binary reftable format (git 2.45+)
    Reftable,
}

/// Git object id (40-character hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(String);

impl Oid {
    /// Parse and validate a 40-character hex oid.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 40 {
            anyhow::bail!("Invalid oid length: expected 40, got {}", s.len());
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid oid: contains non-hex characters");
        }
        Ok(Self(s.to_lowercase()))
    }

    /// Wrap a string already known to be a valid oid (e.g. git output).
    pub(crate) fn from_str_unchecked(s: &str) -> Self {
        Self(s.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 7 characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<git2::Oid> for Oid {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// Expected current value for a compare-and-swap ref update.
#[derive(Debug, Clone)]
pub enum ExpectedRef {
    /// Overwrite whatever is there (force).
    Any,
    /// The ref must currently point at this oid.
    Current(Oid),
}

/// Primitive git operations, format-agnostic.
///
/// Every method that mutates a ref must leave no stale view behind: a
/// subsequent read through the same backend observes the new value.
pub trait GitBackend: Send {
    fn git_dir(&self) -> &Path;
    fn workdir(&self) -> &Path;
    fn ref_format(&self) -> RefFormat;

    // Branches

    /// Current branch name; fails on detached HEAD.
    fn current_branch(&self) -> Result<String>;
    fn create_branch_at(&self, name: &str, at_ref: &str) -> Result<()>;
    fn branch_exists(&self, name: &str) -> Result<bool>;
    fn checkout_branch(&self, name: &str) -> Result<()>;
    fn list_branches(&self) -> Result<Vec<String>>;
    fn delete_branch(&self, name: &str) -> Result<()>;
    fn rename_branch(&self, old_name: &str, new_name: &str) -> Result<()>;

    // Index and commits

    /// `git add -A`
    fn stage_all(&self) -> Result<()>;
    /// `git add -u`
    fn stage_tracked(&self) -> Result<()>;
    /// Commit the index. `amend` rewrites the tip; `reset_author` stamps the
    /// current user as author (only meaningful with `amend`).
    fn commit(&self, message: Option<&str>, amend: bool, reset_author: bool) -> Result<()>;

    // Refs

    /// Create or update a ref, optionally compare-and-swap on the expected
    /// current target.
    fn update_reference(&self, name: &str, target: &Oid, expected: &ExpectedRef, log_msg: &str) -> Result<()>;
    /// Idempotent delete.
    fn delete_reference(&self, name: &str) -> Result<()>;
    fn find_reference(&self, name: &str) -> Result<Option<Oid>>;
    fn list_references(&self, pattern: &str) -> Result<Vec<(String, Oid)>>;

    // Blobs

    fn create_blob(&self, content: &[u8]) -> Result<Oid>;
    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>>;

    // Status

    fn has_uncommitted_changes(&self) -> Result<bool>;
    fn has_staged_changes(&self) -> Result<bool>;
    /// Staged or modified tracked files; untracked files don't count.
    fn has_staged_or_modified_changes(&self) -> Result<bool>;

    // Commit graph queries

    fn resolve(&self, reference: &str) -> Result<Oid>;
    fn merge_base(&self, a: &str, b: &str) -> Result<Oid>;
    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool>;
    fn commit_subject(&self, reference: &str) -> Result<String>;
}

/// Detect the ref format of a repository.
pub fn detect_ref_format(path: &Path) -> Result<RefFormat> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-ref-format"])
        .current_dir(path)
        .output()
        .context("Failed to detect ref format")?;

    if !output.status.success() {
        // Older git - only files format existed
        return Ok(RefFormat::Files);
    }

    let format = String::from_utf8_lossy(&output.stdout);
    match format.trim() {
        "reftable" => Ok(RefFormat::Reftable),
        _ => Ok(RefFormat::Files),
    }
}

/// Create the appropriate backend for a repository.
pub fn create_backend(path: &Path) -> Result<Box<dyn GitBackend>> {
    match detect_ref_format(path)? {
        RefFormat::Reftable => Ok(Box::new(SubprocessBackend::open(path)?)),
        RefFormat::Files => match Git2Backend::open(path) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(_) => Ok(Box::new(SubprocessBackend::open(path)?)),
        },
    }
}
