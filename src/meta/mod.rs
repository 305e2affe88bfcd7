//! Metadata store: one JSON payload per tracked branch, persisted as a git
//! blob addressed by `refs/stackit/metadata/<branch>`.
//!
//! Writing hashes the payload into the object database and repoints the ref;
//! the ref update is atomic, so a failed write leaves the previous payload
//! intact. Reading resolves the ref and reads the blob. Refs travel with
//! push/fetch, so the stack survives clone boundaries.
//!
//! A small per-branch cache fronts `get`. The store once shipped without
//! invalidation and `set_parent` followed by `restack` read a stale parent;
//! every write path now updates the cache entry before returning. Reads
//! through a fresh store always hit git, which has no stale view.

mod payload;

pub use payload::{validate_branch_name, BranchMetadata, PrInfo, PrState, ScopeSetting, SCOPE_NONE};

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::errors::StackError;
use crate::git_backend::ExpectedRef;
use crate::git_gateway::GitGateway;

/// Prefix for metadata refs.
pub const METADATA_REF_PREFIX: &str = "refs/stackit/metadata/";

pub struct MetadataStore {
    gateway: GitGateway,
    cache: RefCell<HashMap<String, Option<BranchMetadata>>>,
}

impl MetadataStore {
    /// Open the store for the repository containing the current directory.
    pub fn new() -> Result<Self> {
        Ok(Self {
            gateway: GitGateway::new()?,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self {
            gateway: GitGateway::from_path(path)?,
            cache: RefCell::new(HashMap::new()),
        })
    }

    fn ref_name(branch: &str) -> String {
        format!("{}{}", METADATA_REF_PREFIX, branch)
    }

    /// Read one branch's payload. `Ok(None)` means untracked.
    pub fn get(&self, branch: &str) -> Result<Option<BranchMetadata>> {
        if let Some(cached) = self.cache.borrow().get(branch) {
            return Ok(cached.clone());
        }
        let loaded = self.read_from_git(branch)?;
        self.cache.borrow_mut().insert(branch.to_string(), loaded.clone());
        Ok(loaded)
    }

    fn read_from_git(&self, branch: &str) -> Result<Option<BranchMetadata>> {
        let Some(bytes) = self.get_raw(branch)? else {
            return Ok(None);
        };
        let meta = BranchMetadata::from_json(&bytes).map_err(|e| StackError::CorruptMeta {
            branch: branch.to_string(),
            detail: e.to_string(),
        })?;
        if let Some(parent) = &meta.parent_branch_name {
            validate_branch_name(parent, branch)?;
        }
        Ok(Some(meta))
    }

    /// The raw payload bytes, for byte-faithful snapshots.
    pub fn get_raw(&self, branch: &str) -> Result<Option<Vec<u8>>> {
        let Some(blob_oid) = self.gateway.read_ref(&Self::ref_name(branch))? else {
            return Ok(None);
        };
        let bytes = self
            .gateway
            .read_blob(&blob_oid)
            .context(format!("Failed to read metadata blob for '{}'", branch))?;
        Ok(Some(bytes))
    }

    /// Replace the entire payload atomically.
    pub fn set(&self, branch: &str, meta: &BranchMetadata) -> Result<()> {
        if let Some(parent) = &meta.parent_branch_name {
            validate_branch_name(parent, branch)?;
        }
        let bytes = meta.to_json()?;
        self.gateway
            .write_blob_ref(&Self::ref_name(branch), &bytes, &ExpectedRef::Any)
            .context(format!("Failed to write metadata for '{}'", branch))?;
        self.cache
            .borrow_mut()
            .insert(branch.to_string(), Some(meta.clone()));
        Ok(())
    }

    /// Write raw payload bytes (snapshot restore path). No validation: the
    /// bytes were read from a ref this store wrote earlier.
    pub fn set_raw(&self, branch: &str, bytes: &[u8]) -> Result<()> {
        self.gateway
            .write_blob_ref(&Self::ref_name(branch), bytes, &ExpectedRef::Any)?;
        self.cache.borrow_mut().remove(branch);
        Ok(())
    }

    pub fn delete(&self, branch: &str) -> Result<()> {
        self.gateway.delete_ref(&Self::ref_name(branch))?;
        self.cache.borrow_mut().insert(branch.to_string(), None);
        Ok(())
    }

    /// Branch names with a metadata ref, sorted.
    pub fn list_tracked_branches(&self) -> Result<Vec<String>> {
        let mut branches: Vec<String> = self
            .gateway
            .list_refs(METADATA_REF_PREFIX)?
            .into_iter()
            .filter_map(|(name, _)| name.strip_prefix(METADATA_REF_PREFIX).map(|s| s.to_string()))
            .collect();
        branches.sort();
        Ok(branches)
    }

    /// Read every payload: one ref enumeration, then per-ref blob reads.
    /// Corrupt payloads land in the error map instead of failing the batch.
    pub fn batch_read(
        &self,
        names: &[String],
    ) -> Result<(BTreeMap<String, BranchMetadata>, BTreeMap<String, String>)> {
        let refs = self.gateway.list_refs(METADATA_REF_PREFIX)?;
        let by_name: HashMap<&str, &crate::git_gateway::Oid> = refs
            .iter()
            .filter_map(|(name, oid)| name.strip_prefix(METADATA_REF_PREFIX).map(|n| (n, oid)))
            .collect();

        let mut found = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for name in names {
            let Some(blob_oid) = by_name.get(name.as_str()) else {
                continue;
            };
            let bytes = match self.gateway.read_blob(blob_oid) {
                Ok(b) => b,
                Err(e) => {
                    errors.insert(name.clone(), e.to_string());
                    continue;
                }
            };
            match BranchMetadata::from_json(&bytes) {
                Ok(meta) => {
                    found.insert(name.clone(), meta);
                }
                Err(e) => {
                    errors.insert(name.clone(), format!("invalid JSON payload: {}", e));
                }
            }
        }
        Ok((found, errors))
    }

    /// Every valid payload in the store, keyed by branch name.
    pub fn list_all(&self) -> Result<BTreeMap<String, BranchMetadata>> {
        let names = self.list_tracked_branches()?;
        let (found, _errors) = self.batch_read(&names)?;
        Ok(found)
    }

    /// Every raw payload, for snapshot capture.
    pub fn list_all_raw(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for name in self.list_tracked_branches()? {
            if let Some(bytes) = self.get_raw(&name)? {
                out.insert(name, String::from_utf8_lossy(&bytes).to_string());
            }
        }
        Ok(out)
    }

    /// Move a payload to a new branch name, removing the old ref.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if let Some(bytes) = self.get_raw(old)? {
            self.set_raw(new, &bytes)?;
            self.delete(old)?;
        }
        Ok(())
    }

    pub fn is_tracked(&self, branch: &str) -> Result<bool> {
        Ok(self.gateway.read_ref(&Self::ref_name(branch))?.is_some())
    }
}
