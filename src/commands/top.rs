//! Jump to the top of the current stack.

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

    let mut current = gateway.current_branch()?;
    loop {
        let children = graph.children_of(&current);
        match children.len() {
            0 => break,
            1 => current = children[0].clone(),
            _ => {
                anyhow::bail!(
                    "'{}' has multiple children: {}. Use 'stackit up --to <branch>'.",
                    current,
                    children.join(", ")
                );
            }
        }
    }

    gateway.checkout_branch(&current)?;
    ui::success(&format!("Switched to {}", ui::branch_name(&current)));
    Ok(())
}
