//! Collapse every commit on the current branch into one.

use anyhow::Result;

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::acquire_operation_lock;
use crate::ui;

use super::restack;

pub fn run(message: Option<String>, no_restack: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    gateway.require_clean_for_rebase()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    if graph.is_trunk(&branch) {
        return Err(StackError::TrunkRefusal {
            branch,
            action: "squash",
        }
        .into());
    }
    let parent = graph.require_tracked(&branch)?.parent.clone().unwrap_or_default();

    let fork = restack::determine_upstream(&gateway, &store, &branch, &parent)?;
    let commits = gateway.commits_between(&fork, &branch)?;
    match commits.len() {
        0 => {
            ui::success("Branch has no commits to squash");
            return Ok(());
        }
        1 => {
            ui::success("Branch already has a single commit");
            return Ok(());
        }
        _ => {}
    }

    let snapshot = super::take_snapshot(&gateway, &store, &config, "squash")?;

    // Default message: the first (oldest) commit's subject
    let msg = message.unwrap_or_else(|| commits[0].1.clone());

    gateway.reset_soft(&fork)?;
    gateway.commit(&msg)?;
    ui::success_bold(&format!(
        "Squashed {} commits on {} into one",
        commits.len(),
        ui::branch_name(&branch)
    ));

    if no_restack {
        ui::step("Skipping restack of descendants (-n)");
        return Ok(());
    }
    let graph = BranchGraph::load(&gateway, &store, &config)?;
    restack::restack_descendants(&gateway, &store, &config, &graph, &branch, &snapshot.id)
}
