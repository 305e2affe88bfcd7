//! Rename the current branch, keeping the graph transparent to children.

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::acquire_operation_lock;
use crate::ui;

pub fn run(new_name: Option<String>, force: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    let new_name = match new_name {
        Some(n) => crate::config::sanitize_ref_name(&n),
        None => ui::input_branch_name("New branch name")?,
    };
    if new_name.is_empty() {
        anyhow::bail!("Branch name is empty after sanitization");
    }
    if new_name == branch {
        ui::success("Name unchanged");
        return Ok(());
    }

    let has_pr = graph.get(&branch).and_then(|b| b.pr_info.as_ref()).is_some();
    if has_pr && !force {
        ui::warning("This branch has a PR; the PR keeps the old head name, so PR info will be cleared.");
        ui::warning("Use --force to keep the PR info attached anyway.");
    }

    super::take_snapshot(&gateway, &store, &config, "rename")?;
    graph.rename(&branch, &new_name, force)?;

    ui::success_bold(&format!(
        "Renamed {} to {}",
        branch,
        ui::branch_name(&new_name)
    ));
    Ok(())
}
