//! Merge the current branch into its parent (or the parent into it with
//! --keep) and delete the absorbed branch.

use anyhow::Result;

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::acquire_operation_lock;
use crate::ui;

use super::restack;

pub fn run(keep: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    if gateway.has_uncommitted_changes()? {
        return Err(StackError::UncommittedChanges.into());
    }

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    if graph.is_trunk(&branch) {
        return Err(StackError::TrunkRefusal {
            branch,
            action: "fold",
        }
        .into());
    }
    let parent = graph.require_tracked(&branch)?.parent.clone().unwrap_or_default();
    if graph.is_trunk(&parent) {
        return Err(StackError::TrunkRefusal {
            branch: parent,
            action: "fold into",
        }
        .into());
    }

    let snapshot = super::take_snapshot(&gateway, &store, &config, "fold")?;

    let survivor = if keep {
        // Parent's commits fold into the current branch; the branch takes
        // the parent's place in the graph.
        let grandparent = graph
            .parent_of(&parent)
            .map(|s| s.to_string())
            .ok_or_else(|| StackError::UntrackedBranch(parent.clone()))?;
        if gateway.merge_no_edit(&parent)?.has_conflicts() {
            gateway.merge_abort()?;
            anyhow::bail!("Folding '{}' produced conflicts; rebase first with 'stackit restack'", parent);
        }
        graph.set_parent(&branch, &grandparent)?;
        graph.delete(&parent, true)?;
        branch.clone()
    } else {
        // The branch's commits fold into the parent.
        gateway.checkout_branch(&parent)?;
        if gateway.merge_no_edit(&branch)?.has_conflicts() {
            gateway.merge_abort()?;
            gateway.checkout_branch(&branch)?;
            anyhow::bail!("Folding into '{}' produced conflicts; restack first", parent);
        }
        graph.delete(&branch, true)?;
        parent.clone()
    };

    ui::success_bold(&format!("Folded into {}", ui::branch_name(&survivor)));

    let graph = BranchGraph::load(&gateway, &store, &config)?;
    restack::restack_descendants(&gateway, &store, &config, &graph, &survivor, &snapshot.id)
}
