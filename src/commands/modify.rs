//! Amend (default) or extend the current branch, then restack descendants.

use anyhow::Result;
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::acquire_operation_lock;
use crate::ui;

use super::restack;

#[allow(clippy::too_many_arguments)]
pub fn run(
    stage_all: bool,
    stage_update: bool,
    stage_patch: bool,
    message: Option<String>,
    new_commit: bool,
    no_restack: bool,
    reset_author: bool,
    interactive_rebase: bool,
) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    if graph.is_trunk(&branch) {
        return Err(StackError::TrunkRefusal {
            branch,
            action: "modify",
        }
        .into());
    }
    graph.require_tracked(&branch)?;

    let snapshot = super::take_snapshot(&gateway, &store, &config, "modify")?;

    if stage_all {
        gateway.stage_all()?;
    } else if stage_update {
        gateway.stage_tracked()?;
    } else if stage_patch {
        gateway.stage_patch_interactive()?;
    }

    if interactive_rebase {
        let parent = graph.parent_of(&branch).unwrap_or("HEAD~1").to_string();
        run_interactive_rebase(&gateway, &parent)?;
    } else if new_commit {
        let Some(msg) = message.as_deref() else {
            anyhow::bail!("A message (-m) is required with -c");
        };
        if !gateway.has_staged_changes()? {
            anyhow::bail!("Nothing staged to commit (use -a/-u/-p to stage)");
        }
        gateway.commit(msg)?;
        ui::success(&format!("Committed: {}", msg));
    } else {
        gateway.amend_commit(message.as_deref(), reset_author)?;
        ui::success("Amended the current commit");
    }

    if no_restack {
        ui::step("Skipping restack of descendants (-n)");
        return Ok(());
    }

    let graph = BranchGraph::load(&gateway, &store, &config)?;
    restack::restack_descendants(&gateway, &store, &config, &graph, &branch, &snapshot.id)
}

fn run_interactive_rebase(gateway: &GitGateway, parent: &str) -> Result<()> {
    if crate::context::non_interactive() {
        anyhow::bail!("Interactive rebase is disabled in non-interactive mode");
    }
    let status = Command::new("git")
        .args(["rebase", "-i", parent])
        .current_dir(gateway.workdir())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;
    if !status.success() {
        anyhow::bail!("Interactive rebase did not complete; resolve and rerun");
    }
    Ok(())
}
