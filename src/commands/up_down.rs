//! Stack navigation: move between parent and children.

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;

/// Move `steps` levels toward the leaves, or jump to `--to <branch>`.
pub fn run_up(steps: usize, to: Option<String>) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let mut current = gateway.current_branch()?;

    if let Some(target) = to {
        let upstack = graph.descendants(&current)?;
        if !upstack.contains(&target) {
            anyhow::bail!("'{}' is not upstack of '{}'", target, current);
        }
        gateway.checkout_branch(&target)?;
        ui::success(&format!("Switched to {}", ui::branch_name(&target)));
        return Ok(());
    }

    for _ in 0..steps.max(1) {
        let children = graph.children_of(&current);
        match children.len() {
            0 => {
                ui::success(&format!("Already at the top ({})", current));
                break;
            }
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

/// Move `steps` levels toward trunk.
pub fn run_down(steps: usize) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let mut current = gateway.current_branch()?;
    for _ in 0..steps.max(1) {
        match graph.parent_of(&current) {
            Some(parent) => current = parent.to_string(),
            None => {
                ui::success(&format!("Already at the bottom ({})", current));
                break;
            }
        }
    }

    gateway.checkout_branch(&current)?;
    ui::success(&format!("Switched to {}", ui::branch_name(&current)));
    Ok(())
}
