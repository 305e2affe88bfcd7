//! Adopt a branch into the graph, or release it.

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;

pub fn run_track(branch: Option<String>, parent: Option<String>) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;
    let trunk = graph.trunk()?;

    let branch = match branch {
        Some(b) => b,
        None => gateway.current_branch()?,
    };
    let parent = parent.unwrap_or(trunk);

    if graph.is_tracked(&branch) && graph.parent_of(&branch).is_some() {
        ui::success(&format!(
            "'{}' is already tracked (parent: {})",
            branch,
            graph.parent_of(&branch).unwrap_or("?")
        ));
        return Ok(());
    }

    graph.track(&branch, &parent)?;
    ui::success_bold(&format!(
        "Tracking {} with parent {}",
        ui::branch_name(&branch),
        parent
    ));
    Ok(())
}

pub fn run_untrack(branch: Option<String>) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = match branch {
        Some(b) => b,
        None => gateway.current_branch()?,
    };

    if !graph.is_tracked(&branch) {
        ui::success(&format!("'{}' is not tracked", branch));
        return Ok(());
    }
    if graph.is_trunk(&branch) {
        anyhow::bail!("'{}' is a trunk; remove it from the config instead", branch);
    }

    // Children are re-pointed at the grandparent, the branch ref stays
    let children = graph.children_of(&branch).to_vec();
    if let Some(grandparent) = graph.parent_of(&branch).map(|s| s.to_string()) {
        for child in &children {
            graph.set_parent(child, &grandparent)?;
        }
    }
    graph.untrack(&branch)?;

    ui::success_bold(&format!("Stopped tracking {}", ui::branch_name(&branch)));
    Ok(())
}
