//! Integrity audit over the graph, metadata and environment.

use anyhow::Result;

use crate::config::Config;
use crate::forge;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;
use crate::validation::{prune_orphaned_metadata, repair_orphaned_branches};

pub fn run(fix: bool) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;

    let mut problems = 0usize;
    let mut fixed = 0usize;

    // Environment
    match std::process::Command::new("git").arg("--version").output() {
        Ok(out) if out.status.success() => ui::success("git binary found"),
        _ => {
            ui::error("git binary not found on PATH");
            problems += 1;
        }
    }

    match forge::detect(&gateway) {
        Ok(forge_impl) => match forge_impl.check_auth() {
            Ok(()) => ui::success(&format!("{} auth reachable", forge_impl.host_name())),
            Err(e) => {
                ui::warning(&format!("PR host not authenticated: {:#}", e));
            }
        },
        Err(e) => ui::warning(&format!("No PR host detected: {:#}", e)),
    }

    // Trunk
    match config.primary_trunk() {
        Some(trunk) if gateway.branch_exists(trunk)? => {
            ui::success(&format!("trunk configured: {}", trunk));
        }
        Some(trunk) => {
            ui::error(&format!("configured trunk '{}' does not exist locally", trunk));
            problems += 1;
        }
        None => {
            ui::error("no trunk configured; run 'stackit init'");
            problems += 1;
        }
    }

    // Corrupt metadata: report, never auto-fix
    let names = store.list_tracked_branches()?;
    let (_, corrupt) = store.batch_read(&names)?;
    for (branch, detail) in &corrupt {
        ui::error(&format!("corrupt metadata for '{}': {}", branch, detail));
        ui::bullet(&format!(
            "inspect with: git cat-file blob $(git rev-parse refs/stackit/metadata/{})",
            branch
        ));
        problems += 1;
    }

    // Orphaned metadata (branch deleted, record remains)
    let mut orphans = Vec::new();
    for branch in &names {
        if !gateway.branch_exists(branch)? && !config.is_trunk(branch) {
            orphans.push(branch.clone());
        }
    }
    if !orphans.is_empty() {
        problems += orphans.len();
        for orphan in &orphans {
            ui::warning(&format!("metadata for '{}' has no local branch", orphan));
        }
        if fix {
            let pruned = prune_orphaned_metadata(&gateway, &store, &config.trunks)?;
            fixed += pruned.len();
            for branch in pruned {
                ui::success(&format!("pruned metadata for '{}'", branch));
            }
        }
    }

    // Graph structure
    let graph = BranchGraph::load(&gateway, &store, &config)?;
    for cycle in graph.detect_cycles() {
        ui::error(&format!(
            "parent cycle: {} -> {}",
            cycle.join(" -> "),
            cycle.first().map(|s| s.as_str()).unwrap_or("?")
        ));
        ui::bullet("break it manually with 'stackit track <branch> -p <new-parent>'");
        problems += 1;
    }

    let missing_parents: Vec<(String, String)> = graph
        .all_branches()
        .filter(|b| b.exists_locally())
        .filter_map(|b| {
            let parent = b.parent.as_deref()?;
            let exists = graph.get(parent).map(|p| p.exists_locally()).unwrap_or(false) || graph.is_trunk(parent);
            if exists {
                None
            } else {
                Some((b.name.clone(), parent.to_string()))
            }
        })
        .collect();
    for (branch, parent) in &missing_parents {
        ui::warning(&format!("'{}' points at missing parent '{}'", branch, parent));
        problems += 1;
    }
    if fix && !missing_parents.is_empty() {
        if let Some(trunk) = config.primary_trunk() {
            let mut graph = BranchGraph::load(&gateway, &store, &config)?;
            let repaired = repair_orphaned_branches(&mut graph, trunk)?;
            fixed += repaired.len();
        }
    }

    println!();
    if problems == 0 {
        ui::success_bold("Everything checks out");
    } else if fix {
        ui::success_bold(&format!("{} issue(s) found, {} repaired", problems, fixed));
    } else {
        ui::warning(&format!(
            "{} issue(s) found. Rerun with --fix to repair what is safe to repair.",
            problems
        ));
    }
    Ok(())
}
