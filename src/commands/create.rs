//! Create a new child branch of the current branch.

use anyhow::Result;

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
    name: Option<String>,
    message: Option<String>,
    stage_all: bool,
    stage_update: bool,
    stage_patch: bool,
    insert: bool,
    scope: Option<String>,
) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    config.require_trunk()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let parent = gateway.current_branch()?;
    if !graph.is_tracked(&parent) {
        return Err(StackError::UntrackedBranch(parent).into());
    }

    // Name comes either from the user or from the pattern + commit message
    let branch_name = match (&name, &message) {
        (Some(n), _) => crate::config::sanitize_ref_name(n),
        (None, Some(msg)) => {
            let effective_scope = scope.clone().or_else(|| graph.effective_scope(&parent));
            config.generate_branch_name(msg, effective_scope.as_deref(), &gateway.username())
        }
        (None, None) => {
            anyhow::bail!("Provide a branch name or a commit message (-m) to derive one from")
        }
    };
    if branch_name.is_empty() {
        anyhow::bail!("Branch name is empty after sanitization");
    }
    if gateway.branch_exists(&branch_name)? {
        anyhow::bail!("Branch '{}' already exists", branch_name);
    }

    let snapshot = super::take_snapshot(&gateway, &store, &config, "create")?;

    if stage_all {
        gateway.stage_all()?;
    } else if stage_update {
        gateway.stage_tracked()?;
    } else if stage_patch {
        gateway.stage_patch_interactive()?;
    }

    // With --insert the new branch slips between the parent and its child
    let child_to_reparent = if insert {
        let children = graph.children_of(&parent).to_vec();
        match children.len() {
            0 => None,
            1 => Some(children[0].clone()),
            _ => anyhow::bail!(
                "'{}' has {} children; --insert needs exactly one ({})",
                parent,
                children.len(),
                children.join(", ")
            ),
        }
    } else {
        None
    };

    gateway.create_and_checkout_branch(&branch_name)?;

    let meta = crate::graph::new_branch_metadata(&parent, scope.as_deref());
    store.set(&branch_name, &meta)?;

    if gateway.has_staged_changes()? {
        let msg = message.clone().unwrap_or_else(|| branch_name.clone());
        gateway.commit(&msg)?;
        ui::success(&format!("Committed staged changes: {}", msg));
    } else if message.is_some() {
        ui::warning("Nothing staged; created the branch without a commit (use -a/-u/-p to stage)");
    }

    ui::success_bold(&format!(
        "Created {} on {}",
        ui::branch_name(&branch_name),
        parent
    ));

    if let Some(child) = child_to_reparent {
        let mut graph = BranchGraph::load(&gateway, &store, &config)?;
        graph.set_parent(&child, &branch_name)?;
        ui::step(&format!("Inserted before {}; restacking it", child));
        restack::restack_descendants(&gateway, &store, &config, &graph, &branch_name, &snapshot.id)?;
    }

    Ok(())
}
