//! Delete branches; children adopt the deleted branch's parent.

use anyhow::Result;

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::acquire_operation_lock;
use crate::ui;

pub fn run(name: Option<String>, upstack: bool, downstack: bool, force: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let trunk = config.require_trunk()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    let current = gateway.current_branch().ok();
    let target = match name {
        Some(n) => n,
        None => current.clone().ok_or(StackError::NotOnBranch)?,
    };

    if graph.is_trunk(&target) {
        return Err(StackError::TrunkRefusal {
            branch: target,
            action: "delete",
        }
        .into());
    }
    if !gateway.branch_exists(&target)? {
        anyhow::bail!("Branch '{}' does not exist", target);
    }

    // Build the deletion set; leaves last so adoption stays local
    let mut doomed: Vec<String> = if upstack {
        graph.upstack(&target)?
    } else if downstack {
        let mut chain = graph.downstack(&target)?;
        chain.retain(|b| !graph.is_trunk(b));
        chain
    } else {
        vec![target.clone()]
    };
    doomed = graph.topo_sort(&doomed);

    let unmerged: Vec<&String> = doomed
        .iter()
        .filter(|b| !gateway.is_ancestor(b, &trunk).unwrap_or(false))
        .collect();
    if !unmerged.is_empty() && !force {
        ui::warning(&format!(
            "{} branch(es) are not merged into {}:",
            unmerged.len(),
            trunk
        ));
        for b in &unmerged {
            ui::bullet(b);
        }
        if !ui::confirm("Delete anyway?", false)? {
            anyhow::bail!("Aborted.");
        }
    }

    super::take_snapshot(&gateway, &store, &config, "delete")?;

    // Step off a branch that is about to go away
    if let Some(cur) = &current {
        if doomed.contains(cur) {
            let refuge = graph
                .parent_of(&target)
                .filter(|p| !doomed.contains(&p.to_string()))
                .unwrap_or(&trunk)
                .to_string();
            gateway.checkout_branch(&refuge)?;
        }
    }

    for branch in &doomed {
        graph.delete(branch, true)?;
        ui::success(&format!("Deleted {}", branch));
    }

    ui::success_bold(&format!("Deleted {} branch(es)", doomed.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::BranchMetadata;
    use crate::test_context::{init_test_repo, TestRepoContext};
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path) -> Result<(GitGateway, MetadataStore)> {
        let local = crate::config::LocalConfig {
            trunks: vec!["main".into()],
            ..Default::default()
        };
        std::fs::write(dir.join(".git/stackit/config.toml"), toml::to_string_pretty(&local)?)?;
        Ok((GitGateway::new()?, MetadataStore::new()?))
    }

    fn chain(gateway: &GitGateway, store: &MetadataStore, names: &[&str]) -> Result<()> {
        let mut parent = "main".to_string();
        for name in names {
            gateway.create_branch_at(name, &parent)?;
            store.set(name, &BranchMetadata::with_parent(&parent))?;
            parent = name.to_string();
        }
        Ok(())
    }

    #[test]
    fn test_delete_middle_branch_adopts_children() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());
        let (gateway, store) = setup(dir.path())?;
        chain(&gateway, &store, &["a", "b", "c"])?;

        run(Some("b".into()), false, false, true)?;

        assert!(!gateway.branch_exists("b")?);
        assert_eq!(store.get("c")?.unwrap().parent_branch_name.as_deref(), Some("a"));
        Ok(())
    }

    #[test]
    fn test_delete_upstack_removes_descendants() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());
        let (gateway, store) = setup(dir.path())?;
        chain(&gateway, &store, &["a", "b", "c"])?;

        run(Some("b".into()), true, false, true)?;

        assert!(gateway.branch_exists("a")?);
        assert!(!gateway.branch_exists("b")?);
        assert!(!gateway.branch_exists("c")?);
        assert!(store.get("c")?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_trunk_refused() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());
        let (_gateway, _store) = setup(dir.path())?;

        let result = run(Some("main".into()), false, false, true);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("trunk"));
        Ok(())
    }

    #[test]
    fn test_delete_current_branch_steps_off_first() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());
        let (gateway, store) = setup(dir.path())?;
        chain(&gateway, &store, &["a"])?;
        gateway.checkout_branch("a")?;

        run(None, false, false, true)?;

        assert_eq!(gateway.current_branch()?, "main");
        assert!(!gateway.branch_exists("a")?);
        Ok(())
    }
}
