//! Graph repair helpers shared by restack, sync and the doctor.

use anyhow::Result;

use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;

/// Reparent branches whose parent no longer exists locally.
///
/// This happens when a parent branch was merged and deleted through the PR
/// host UI: the children's payloads still name it. Each orphan is moved to
/// its nearest surviving ancestor, falling back to trunk.
///
/// Returns the branches that were repaired.
pub fn repair_orphaned_branches(graph: &mut BranchGraph, trunk: &str) -> Result<Vec<String>> {
    let orphans: Vec<(String, String)> = graph
        .all_branches()
        .filter(|b| b.exists_locally())
        .filter_map(|b| {
            let parent = b.parent.as_deref()?;
            let parent_missing = graph
                .get(parent)
                .map(|p| !p.exists_locally())
                .unwrap_or(!graph.is_trunk(parent));
            if parent_missing {
                Some((b.name.clone(), parent.to_string()))
            } else {
                None
            }
        })
        .collect();

    let mut repaired = Vec::new();
    for (branch, lost_parent) in orphans {
        let target = nearest_surviving_ancestor(graph, &lost_parent, trunk);
        ui::warning(&format!(
            "Parent '{}' of '{}' no longer exists; reparenting onto '{}'",
            lost_parent, branch, target
        ));
        graph.set_parent(&branch, &target)?;
        repaired.push(branch);
    }
    Ok(repaired)
}

/// Walk up from a missing branch's recorded parent chain to the first
/// branch that still exists locally, stopping at trunk.
fn nearest_surviving_ancestor(graph: &BranchGraph, from: &str, trunk: &str) -> String {
    let mut current = from.to_string();
    let mut hops = 0;
    while let Some(branch) = graph.get(&current) {
        if branch.exists_locally() || graph.is_trunk(&current) {
            return current;
        }
        match &branch.parent {
            Some(parent) if hops < 100 => {
                current = parent.clone();
                hops += 1;
            }
            _ => break,
        }
    }
    trunk.to_string()
}

/// Delete metadata records whose branch no longer exists and has no
/// children to adopt. Returns the pruned names.
pub fn prune_orphaned_metadata(
    gateway: &GitGateway,
    store: &MetadataStore,
    trunks: &[String],
) -> Result<Vec<String>> {
    let mut pruned = Vec::new();
    for branch in store.list_tracked_branches()? {
        if trunks.iter().any(|t| t == &branch) {
            continue;
        }
        if !gateway.branch_exists(&branch)? {
            store.delete(&branch)?;
            pruned.push(branch);
        }
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::meta::BranchMetadata;
    use crate::test_context::{init_test_repo, TestRepoContext};
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config {
            trunks: vec!["main".into()],
            naming: Default::default(),
            undo: Default::default(),
            sync: Default::default(),
            remote: "origin".into(),
        }
    }

    #[test]
    fn test_repair_reparents_to_trunk_when_chain_is_gone() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        // child's parent "gone" never existed locally
        gateway.create_branch_at("child", "main")?;
        store.set("child", &BranchMetadata::with_parent("gone"))?;

        let config = test_config();
        let mut graph = BranchGraph::load(&gateway, &store, &config)?;
        let repaired = repair_orphaned_branches(&mut graph, "main")?;

        assert_eq!(repaired, vec!["child"]);
        assert_eq!(store.get("child")?.unwrap().parent_branch_name.as_deref(), Some("main"));
        Ok(())
    }

    #[test]
    fn test_repair_walks_to_surviving_ancestor() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        // a exists; mid is deleted but its metadata survives, naming a
        gateway.create_branch_at("a", "main")?;
        store.set("a", &BranchMetadata::with_parent("main"))?;
        store.set("mid", &BranchMetadata::with_parent("a"))?;
        gateway.create_branch_at("leaf", "main")?;
        store.set("leaf", &BranchMetadata::with_parent("mid"))?;

        let config = test_config();
        let mut graph = BranchGraph::load(&gateway, &store, &config)?;
        let repaired = repair_orphaned_branches(&mut graph, "main")?;

        assert_eq!(repaired, vec!["leaf"]);
        assert_eq!(store.get("leaf")?.unwrap().parent_branch_name.as_deref(), Some("a"));
        Ok(())
    }

    #[test]
    fn test_prune_removes_metadata_without_branch() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        gateway.create_branch_at("alive", "main")?;
        store.set("alive", &BranchMetadata::with_parent("main"))?;
        store.set("phantom", &BranchMetadata::with_parent("main"))?;

        let pruned = prune_orphaned_metadata(&gateway, &store, &["main".into()])?;
        assert_eq!(pruned, vec!["phantom"]);
        assert!(store.get("phantom")?.is_none());
        assert!(store.get("alive")?.is_some());
        Ok(())
    }
}
