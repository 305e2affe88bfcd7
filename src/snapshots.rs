//! Undo snapshots.
//!
//! Every command that mutates refs or metadata first captures a snapshot:
//! the tips of all tracked branches and every raw metadata payload, plus
//! the command that is about to run. Snapshots are JSON files in
//! `<git-dir>/stackit/undo/<id>.json`, a bounded ring — the oldest is
//! evicted once the configured depth is exceeded.
//!
//! Ids are `<unix-millis>-<counter>`, zero-padded, so lexicographic order
//! is creation order even within one millisecond.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::git_gateway::{GitGateway, Oid};
use crate::meta::MetadataStore;
use crate::state::find_git_root;

static SNAPSHOT_COUNTER: AtomicU32 = AtomicU32::new(0);

pub const DEFAULT_DEPTH: usize = 50;

/// One captured `(tips, metadata)` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Command name that took the snapshot (e.g. "restack").
    pub command: String,
    pub argv: Vec<String>,
    /// Branch name to tip oid, for every tracked branch at capture time.
    pub tips: BTreeMap<String, String>,
    /// Branch name to raw metadata payload (exact bytes as JSON string).
    pub metadata: BTreeMap<String, String>,
}

pub struct SnapshotStore {
    dir: PathBuf,
    depth: usize,
}

impl SnapshotStore {
    pub fn open(depth: usize) -> Result<Self> {
        let root = find_git_root()?;
        Ok(Self::at(&root, depth))
    }

    pub fn at(repo_root: &Path, depth: usize) -> Self {
        Self {
            dir: repo_root.join(".git").join("stackit").join("undo"),
            depth: depth.max(1),
        }
    }

    /// Capture the current graph state before `command` mutates it.
    pub fn take(
        &self,
        gateway: &GitGateway,
        store: &MetadataStore,
        trunks: &[String],
        command: &str,
        argv: &[String],
    ) -> Result<Snapshot> {
        let mut tips = BTreeMap::new();
        for branch in store.list_tracked_branches()? {
            if let Ok(tip) = gateway.branch_tip(&branch) {
                tips.insert(branch, tip.to_string());
            }
        }
        for trunk in trunks {
            if let Ok(tip) = gateway.branch_tip(trunk) {
                tips.insert(trunk.clone(), tip.to_string());
            }
        }

        let metadata = store.list_all_raw()?;

        let now = Utc::now();
        let counter = SNAPSHOT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let snapshot = Snapshot {
            id: format!("{:013}-{:04}", now.timestamp_millis(), counter),
            timestamp: now,
            command: command.to_string(),
            argv: argv.to_vec(),
            tips,
            metadata,
        };

        fs::create_dir_all(&self.dir).context("Failed to create undo directory")?;
        let path = self.path_for(&snapshot.id);
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, content).with_context(|| format!("Failed to write snapshot {:?}", path))?;

        self.evict_beyond_depth()?;
        Ok(snapshot)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// All snapshots, newest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        if !self.dir.exists() {
            return Ok(snapshots);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path).ok().and_then(|c| serde_json::from_str(&c).ok()) {
                Some(snapshot) => snapshots.push(snapshot),
                None => eprintln!("Warning: skipping unreadable snapshot {:?}", path),
            }
        }
        snapshots.sort_by(|a: &Snapshot, b: &Snapshot| b.id.cmp(&a.id));
        Ok(snapshots)
    }

    pub fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.list()?.into_iter().next())
    }

    pub fn get(&self, id: &str) -> Result<Snapshot> {
        let path = self.path_for(id);
        let content = fs::read_to_string(&path).with_context(|| format!("No snapshot with id '{}'", id))?;
        serde_json::from_str(&content).with_context(|| format!("Snapshot '{}' is corrupted", id))
    }

    fn evict_beyond_depth(&self) -> Result<()> {
        let snapshots = self.list()?;
        for old in snapshots.iter().skip(self.depth) {
            let _ = fs::remove_file(self.path_for(&old.id));
        }
        Ok(())
    }

    /// Restore a snapshot: reset every captured branch ref (creating
    /// branches that were deleted), rewrite every metadata payload
    /// byte-for-byte, and delete branches that are tracked now but were not
    /// captured. The worktree is synced when the checked-out branch moved.
    pub fn restore(&self, gateway: &GitGateway, store: &MetadataStore, snapshot: &Snapshot) -> Result<()> {
        // Branches tracked now but absent from the snapshot were created
        // after capture; they go away.
        let now_tracked = store.list_tracked_branches()?;
        for branch in now_tracked {
            if !snapshot.metadata.contains_key(&branch) {
                store.delete(&branch)?;
                if gateway.branch_exists(&branch)? {
                    // git refuses to delete the checked-out branch
                    if gateway.current_branch().ok().as_deref() == Some(branch.as_str()) {
                        if let Some(fallback) = snapshot.tips.keys().next() {
                            gateway.checkout_branch(fallback)?;
                        }
                    }
                    gateway.delete_branch(&branch)?;
                }
            }
        }

        for (branch, tip) in &snapshot.tips {
            let oid = Oid::parse(tip).with_context(|| format!("Snapshot tip for '{}' is invalid", branch))?;
            gateway.set_branch_tip(branch, &oid)?;
        }

        for (branch, payload) in &snapshot.metadata {
            store.set_raw(branch, payload.as_bytes())?;
        }

        // If HEAD points at a restored branch, align index and worktree
        if let Ok(current) = gateway.current_branch() {
            if snapshot.tips.contains_key(&current) {
                gateway.reset_hard("HEAD")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::BranchMetadata;
    use crate::test_context::{init_test_repo, TestRepoContext};
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_take_and_list_ordering() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;
        let snapshots = SnapshotStore::at(dir.path(), 10);

        let first = snapshots.take(&gateway, &store, &["main".into()], "create", &args(&["create", "a"]))?;
        let second = snapshots.take(&gateway, &store, &["main".into()], "modify", &args(&["modify"]))?;

        assert!(second.id > first.id, "ids must sort by creation order");
        let listed = snapshots.list()?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[0].command, "modify");
        Ok(())
    }

    #[test]
    fn test_ring_evicts_oldest() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;
        let snapshots = SnapshotStore::at(dir.path(), 3);

        let mut ids = Vec::new();
        for i in 0..5 {
            let s = snapshots.take(&gateway, &store, &[], "cmd", &args(&[&format!("{}", i)]))?;
            ids.push(s.id);
        }

        let listed = snapshots.list()?;
        assert_eq!(listed.len(), 3);
        // The two oldest are gone
        assert!(snapshots.get(&ids[0]).is_err());
        assert!(snapshots.get(&ids[1]).is_err());
        assert!(snapshots.get(&ids[4]).is_ok());
        Ok(())
    }

    #[test]
    fn test_restore_is_inverse_of_mutation() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;
        let snapshots = SnapshotStore::at(dir.path(), 10);

        // Build: main -> feature with one payload
        gateway.create_branch_at("feature", "main")?;
        store.set("feature", &BranchMetadata::with_parent("main"))?;
        let tip_before = gateway.branch_tip("feature")?;
        let raw_before = store.get_raw("feature")?.unwrap();

        let snapshot = snapshots.take(&gateway, &store, &["main".into()], "test", &args(&["test"]))?;

        // Mutate: move the branch, rewrite metadata, add a new branch
        gateway.checkout_branch("feature")?;
        std::fs::write(dir.path().join("x.txt"), "x")?;
        gateway.stage_all()?;
        gateway.commit("mutation")?;
        let mut meta = store.get("feature")?.unwrap();
        meta.scope = Some("TMP".into());
        store.set("feature", &meta)?;
        gateway.create_branch_at("later", "main")?;
        store.set("later", &BranchMetadata::with_parent("feature"))?;

        snapshots.restore(&gateway, &store, &snapshot)?;

        // Byte-for-byte inverse
        assert_eq!(gateway.branch_tip("feature")?, tip_before);
        assert_eq!(store.get_raw("feature")?.unwrap(), raw_before);
        assert!(store.get("later")?.is_none(), "post-snapshot branch must be untracked");
        assert!(!gateway.branch_exists("later")?, "post-snapshot branch must be deleted");
        Ok(())
    }

    #[test]
    fn test_restore_recreates_deleted_branch() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;
        let snapshots = SnapshotStore::at(dir.path(), 10);

        gateway.create_branch_at("doomed", "main")?;
        store.set("doomed", &BranchMetadata::with_parent("main"))?;
        let tip = gateway.branch_tip("doomed")?;

        let snapshot = snapshots.take(&gateway, &store, &["main".into()], "delete", &args(&["delete"]))?;

        store.delete("doomed")?;
        gateway.delete_branch("doomed")?;

        snapshots.restore(&gateway, &store, &snapshot)?;
        assert!(gateway.branch_exists("doomed")?);
        assert_eq!(gateway.branch_tip("doomed")?, tip);
        assert!(store.get("doomed")?.is_some());
        Ok(())
    }
}
