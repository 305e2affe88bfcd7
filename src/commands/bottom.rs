//! Jump to the bottom of the current stack (first branch above trunk).

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;

pub fn run() -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let current = gateway.current_branch()?;
    let chain = graph.downstack(&current)?;
    let bottom = chain.first().cloned().unwrap_or(current);

    gateway.checkout_branch(&bottom)?;
    ui::success(&format!("Switched to {}", ui::branch_name(&bottom)));
    Ok(())
}
