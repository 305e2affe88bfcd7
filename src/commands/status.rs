//! Where am I, and is anything halted?

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::state::Continuation;
use crate::ui;

pub fn run() -> Result<()> {
    let gateway = GitGateway::new()?;

    // A halted sequence is the most important thing to report
    if let Some(continuation) = Continuation::load()? {
        ui::warning(&format!(
            "A {} is halted{}",
            continuation.kind,
            continuation
                .current_branch
                .as_deref()
                .map(|b| format!(" on {}", b.yellow()))
                .unwrap_or_default()
        ));
        if !continuation.queue.is_empty() {
            println!("  Remaining: {}", continuation.queue.join(", "));
        }
        println!("  Started by: stackit {}", continuation.argv.join(" "));
        println!(
            "  Run {} after resolving, or {} to roll back.",
            "stackit continue".cyan(),
            "stackit abort".cyan()
        );
        return Ok(());
    }

    match gateway.current_branch() {
        Ok(current) => {
            let store = MetadataStore::new()?;
            let config = Config::load()?;
            let graph = BranchGraph::load(&gateway, &store, &config)?;

            println!("On branch {}", ui::branch_name(&current));
            if let Some(parent) = graph.parent_of(&current) {
                println!("  parent: {}", parent);
                if graph.needs_restack(&current)? {
                    println!("  {}", "needs restack (parent moved)".yellow());
                }
            } else if graph.is_trunk(&current) {
                println!("  trunk branch");
            } else {
                println!("  untracked (adopt it with 'stackit track')");
            }
        }
        Err(_) => println!("Detached HEAD"),
    }

    if gateway.has_staged_changes()? {
        println!("  staged changes present");
    } else if gateway.has_uncommitted_changes()? {
        println!("  uncommitted changes present");
    }
    Ok(())
}
