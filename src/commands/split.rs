//! Split one tracked branch into a chain of smaller branches.
//!
//! Three strategies: by commit (branch points over the commit history),
//! by hunk (interactive re-staging loop), and by file (extract pathspecs
//! into a new parent branch).

use anyhow::Result;
use std::io::IsTerminal;

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::{BranchMetadata, MetadataStore};
use crate::snapshots::SnapshotStore;
use crate::state::acquire_operation_lock;
use crate::ui;

use super::restack;

pub fn run(by_commit: bool, by_hunk: bool, by_file: Option<Vec<String>>) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    config.require_trunk()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    if graph.is_trunk(&branch) {
        return Err(StackError::TrunkRefusal {
            branch,
            action: "split",
        }
        .into());
    }
    let parent = graph.require_tracked(&branch)?.parent.clone().unwrap_or_default();

    if let Some(patterns) = by_file {
        run_by_file(&gateway, &store, &config, &mut graph, &branch, &parent, patterns)
    } else if by_hunk {
        run_by_hunk(&gateway, &store, &config, &branch, &parent)
    } else if by_commit {
        run_by_commit(&gateway, &store, &config, &mut graph, &branch, &parent)
    } else {
        anyhow::bail!("Choose a mode: --by-commit, --by-hunk, or --by-file <paths...>")
    }
}

// ---------------------------------------------------------------------
// by commit
// ---------------------------------------------------------------------

/// Each selected branch point ends a segment; each segment becomes a
/// branch. The last segment keeps the original name so PR linkage
/// survives.
fn run_by_commit(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    graph: &mut BranchGraph,
    branch: &str,
    parent: &str,
) -> Result<()> {
    gateway.require_clean_for_rebase()?;

    let base = gateway.merge_base(branch, parent)?;
    let commits: Vec<(String, String)> = gateway
        .commits_between(base.as_str(), branch)?
        .into_iter()
        .map(|(oid, subject)| (oid.to_string(), subject))
        .collect();

    if commits.len() < 2 {
        ui::success("Branch has fewer than two commits; nothing to split");
        return Ok(());
    }

    // Branch points: indices (oldest->newest) whose commit ends a segment.
    // The final commit always ends the last segment.
    let cut_indices: Vec<usize> = if std::io::stdin().is_terminal() && !crate::context::non_interactive() {
        let items: Vec<String> = commits
            .iter()
            .map(|(oid, subject)| format!("{} {}", &oid[..7], subject))
            .collect();
        let chosen = ui::select_indices("Select commits that end a branch (last commit is implied)", &items)?;
        chosen.into_iter().filter(|&i| i < commits.len() - 1).collect()
    } else {
        // Non-interactive: one branch per commit
        (0..commits.len() - 1).collect()
    };

    if cut_indices.is_empty() {
        ui::success("No branch points selected; nothing to split");
        return Ok(());
    }

    super::take_snapshot(gateway, store, config, "split")?;

    let mut cuts = cut_indices;
    cuts.sort_unstable();
    cuts.dedup();

    let mut prev_parent = parent.to_string();
    let mut segment = 1;
    for &idx in &cuts {
        let (oid, subject) = &commits[idx];
        let name = format!("{}-part{}", branch, segment);
        if gateway.branch_exists(&name)? {
            anyhow::bail!("Branch '{}' already exists; rename it first", name);
        }
        gateway.create_branch_at(&name, oid)?;
        store.set(&name, &BranchMetadata::with_parent(&prev_parent))?;
        ui::success(&format!("{} -> \"{}\"", ui::branch_name(&name), subject));
        prev_parent = name;
        segment += 1;
    }

    // The original branch keeps its tip and PR info; only its parent moves
    graph.set_parent(branch, &prev_parent)?;

    ui::success_bold(&format!(
        "Split {} into {} branches",
        ui::branch_name(branch),
        cuts.len() + 1
    ));
    Ok(())
}

// ---------------------------------------------------------------------
// by hunk
// ---------------------------------------------------------------------

/// Soft-reset to the parent tip and interactively re-stage the changes
/// into a chain of single-commit branches. Cancelling restores the
/// original tip from the snapshot.
fn run_by_hunk(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    branch: &str,
    parent: &str,
) -> Result<()> {
    if crate::context::non_interactive() || !std::io::stdin().is_terminal() {
        anyhow::bail!("split --by-hunk needs an interactive terminal; use --by-commit or --by-file instead");
    }
    gateway.require_clean_for_rebase()?;

    let snapshot = super::take_snapshot(gateway, store, config, "split")?;
    let snapshots = SnapshotStore::open(config.undo.depth)?;

    let result = by_hunk_loop(gateway, store, parent);
    match result {
        Ok(created) if !created.is_empty() => {
            // Children of the original branch follow its content to the
            // last created branch; the original (now empty) goes away.
            let graph = BranchGraph::load(gateway, store, config)?;
            let children = graph.children_of(branch).to_vec();
            let last = created.last().cloned().unwrap_or_else(|| parent.to_string());
            drop(graph);
            for child in &children {
                let mut meta = store.get(child)?.unwrap_or_default();
                meta.parent_branch_name = Some(last.clone());
                store.set(child, &meta)?;
            }
            gateway.checkout_branch(&last)?;
            gateway.delete_branch(branch)?;
            store.delete(branch)?;

            ui::success_bold(&format!("Split {} into {} branches", branch, created.len()));
            if !children.is_empty() {
                let graph = BranchGraph::load(gateway, store, config)?;
                restack::restack_descendants(gateway, store, config, &graph, &last, &snapshot.id)?;
            }
            Ok(())
        }
        Ok(_) => {
            ui::success("No branches created; restoring original state");
            snapshots.restore(gateway, store, &snapshots.get(&snapshot.id)?)?;
            gateway.checkout_branch(branch)?;
            Ok(())
        }
        Err(e) => {
            ui::warning("Split cancelled; restoring original state");
            snapshots.restore(gateway, store, &snapshots.get(&snapshot.id)?)?;
            if gateway.branch_exists(branch)? {
                gateway.checkout_branch(branch)?;
                gateway.reset_hard(branch)?;
            }
            Err(e)
        }
    }
}

fn by_hunk_loop(gateway: &GitGateway, store: &MetadataStore, parent: &str) -> Result<Vec<String>> {
    // All of the branch's changes become unstaged edits on top of parent
    gateway.reset_mixed(parent)?;

    let mut created: Vec<String> = Vec::new();
    let mut prev_parent = parent.to_string();

    while gateway.has_uncommitted_changes()? {
        ui::step("Stage the hunks for the next branch (git add -p)");
        gateway.stage_patch_interactive()?;

        if !gateway.has_staged_changes()? {
            ui::warning("Nothing staged; staging everything that remains");
            gateway.stage_all()?;
        }

        let name = ui::input_branch_name("Branch name for these changes")?;
        if gateway.branch_exists(&name)? {
            anyhow::bail!("Branch '{}' already exists", name);
        }

        gateway.create_and_checkout_branch(&name)?;
        gateway.commit(&name)?;
        store.set(&name, &BranchMetadata::with_parent(&prev_parent))?;
        ui::success(&format!("Created {}", ui::branch_name(&name)));

        prev_parent = name.clone();
        created.push(name);
    }

    Ok(created)
}

// ---------------------------------------------------------------------
// by file
// ---------------------------------------------------------------------

/// Extract the selected paths into `<branch>_split`, remove them from the
/// branch, and re-parent the branch onto the extraction.
fn run_by_file(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    graph: &mut BranchGraph,
    branch: &str,
    parent: &str,
    patterns: Vec<String>,
) -> Result<()> {
    if gateway.has_uncommitted_changes()? {
        return Err(StackError::UncommittedChanges.into());
    }

    // Accept both repeated args and comma-separated lists
    let patterns: Vec<String> = patterns
        .iter()
        .flat_map(|p| p.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let parent_tip = gateway.branch_tip(parent)?;
    let changed = gateway.changed_files(parent_tip.as_str(), branch)?;

    let selected: Vec<String> = changed
        .iter()
        .filter(|file| patterns.iter().any(|p| path_matches(p, file)))
        .cloned()
        .collect();

    if selected.is_empty() {
        ui::warning("No changed file matches the given paths");
        ui::step("Files changed on this branch:");
        for file in &changed {
            ui::bullet(file);
        }
        return Ok(());
    }
    if selected.len() == changed.len() {
        anyhow::bail!(
            "Every changed file matches; '{}' would be left empty. Use 'stackit rename' instead.",
            branch
        );
    }

    let split_name = format!("{}_split", branch);
    if gateway.branch_exists(&split_name)? {
        anyhow::bail!("Branch '{}' already exists; rename or delete it first", split_name);
    }

    let snapshot = super::take_snapshot(gateway, store, config, "split")?;

    ui::step(&format!("Extracting {} file(s) into {}", selected.len(), split_name));
    for file in &selected {
        ui::bullet(file);
    }

    // Build the extraction branch from the parent tip
    gateway.create_branch_at(&split_name, parent_tip.as_str())?;
    gateway.checkout_branch(&split_name)?;
    gateway.checkout_paths_from(branch, &selected)?;
    gateway.commit(&format!("Extract {}", selected.join(", ")))?;
    store.set(&split_name, &BranchMetadata::with_parent(parent))?;

    // Drop the extracted paths from the original branch
    gateway.checkout_branch(branch)?;
    gateway.remove_paths(&selected)?;
    gateway.commit(&format!("Remove {} (moved to {})", selected.join(", "), split_name))?;

    graph.set_parent(branch, &split_name)?;

    ui::success_bold(&format!(
        "Split complete: {} -> {} -> {}",
        parent,
        ui::branch_name(&split_name),
        ui::branch_name(branch)
    ));

    // The branch now needs to sit on the extraction; its children follow
    let graph = BranchGraph::load(gateway, store, config)?;
    restack::restack_descendants(gateway, store, config, &graph, &split_name, &snapshot.id)?;
    Ok(())
}

/// Pathspec match: exact file, directory prefix, or `*` glob.
fn path_matches(pattern: &str, file: &str) -> bool {
    if pattern.contains('*') {
        glob_match(pattern, file)
    } else {
        file == pattern || file.starts_with(&format!("{}/", pattern.trim_end_matches('/')))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return text == pattern;
    }
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(found) => {
                if i == 0 && found != 0 {
                    return false;
                }
                pos += found + part.len();
            }
            None => return false,
        }
    }
    pattern.ends_with('*') || pos == text.len()
}
