//! Absorb: distribute staged hunks into the ancestor commits they belong to.
//!
//! Each staged hunk is matched to the most recent commit in the search
//! horizon that touched the lines it edits (blame over the hunk's pre-image
//! range). The horizon covers the current branch and its downstack
//! ancestors, stopping at a trunk or at the first branch whose effective
//! scope differs. Hunks nothing claims are reported and left staged.
//!
//! History rewriting walks target commits oldest-branch-first and, within a
//! branch, oldest-position-first, so a rewrite never invalidates the
//! recorded oids of targets still pending in other branches. A same-branch
//! target whose oid did move is re-found by its position over the branch's
//! plan-time fork point.

use anyhow::Result;
use slog::debug;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::errors::StackError;
use crate::git_gateway::{render_patch, DiffHunk, GitGateway, StashGuard};
use crate::graph::BranchGraph;
use crate::logging;
use crate::meta::MetadataStore;
use crate::state::{acquire_operation_lock, Continuation, OperationKind};
use crate::ui;

use super::restack;

/// One commit receiving hunks.
#[derive(Debug)]
struct TargetGroup {
    branch: String,
    /// The branch's fork point at plan time; positions index from here.
    base: String,
    /// Index into the branch's own commits, oldest first. Stable across
    /// same-branch rewrites, unlike the oid.
    position: usize,
    /// Distance of the owning branch from the oldest horizon branch
    /// (1 = oldest). Rewrites run in ascending order.
    branch_age: usize,
    /// Target commit oid at plan time.
    commit: String,
    subject: String,
    hunks: Vec<DiffHunk>,
}

struct AbsorbPlan {
    groups: Vec<TargetGroup>,
    unabsorbed: Vec<DiffHunk>,
}

pub fn run(stage_all: bool, stage_patch: bool, dry_run: bool, _force: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;

    if stage_all {
        gateway.stage_all()?;
    } else if stage_patch {
        gateway.stage_patch_interactive()?;
    }

    let diff = gateway.diff_staged_hunks()?;
    if diff.is_empty() {
        ui::success("Nothing to absorb.");
        return Ok(());
    }

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    config.require_trunk()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let branch = gateway.current_branch()?;
    if graph.is_trunk(&branch) {
        return Err(StackError::TrunkRefusal {
            branch,
            action: "absorb into",
        }
        .into());
    }
    graph.require_tracked(&branch)?;

    let plan = build_plan(&gateway, &graph, &branch, diff.hunks)?;

    print_plan(&plan);
    if plan.groups.is_empty() {
        ui::success("No hunk matched a commit in the stack; nothing absorbed.");
        return Ok(());
    }
    if dry_run {
        ui::success_bold("Dry run - no changes made");
        return Ok(());
    }

    let snapshot = super::take_snapshot(&gateway, &store, &config, "absorb")?;

    // Detach the staged changes: they now live only in the collected hunks.
    let staged_patch = gateway.staged_patch_text()?;
    gateway.apply_patch(&staged_patch, true, true)?;

    // Protect whatever else is in the worktree while history moves.
    let guard = StashGuard::push(&gateway, "stackit-absorb")?;

    let oldest_branch = match rewrite_targets(&gateway, &plan) {
        Ok(oldest) => oldest,
        Err(e) => {
            // Roll everything back; the guard restores the worktree after
            // the snapshot resets the refs.
            if gateway.rebase_in_progress()? {
                gateway.rebase_abort()?;
            }
            let snapshots = crate::snapshots::SnapshotStore::open(config.undo.depth)?;
            snapshots.restore(&gateway, &store, &snapshot)?;
            gateway.checkout_branch(&branch)?;
            gateway.reset_hard("HEAD")?;
            drop(guard);
            return Err(e);
        }
    };

    // Refs moved: restack everything above the oldest rewritten branch.
    let queue = graph.descendants(&oldest_branch)?;
    let restack_result = if queue.is_empty() {
        Ok(())
    } else {
        let continuation = Continuation::new(
            OperationKind::Absorb,
            graph.topo_sort(&queue),
            super::current_argv(),
            snapshot.id.clone(),
            branch.clone(),
        );
        restack::run_sequence(&gateway, &store, &config, continuation)
    };

    match restack_result {
        Ok(()) => {
            if gateway.branch_exists(&branch)? {
                gateway.checkout_branch(&branch)?;
            }
            if let Some(guard) = guard {
                guard.restore()?;
            }
            if !plan.unabsorbed.is_empty() {
                restage_unabsorbed(&gateway, &plan.unabsorbed)?;
            }
            ui::success_bold(&format!(
                "Absorbed {} hunk(s) into {} commit(s)",
                plan.groups.iter().map(|g| g.hunks.len()).sum::<usize>(),
                plan.groups.len()
            ));
            Ok(())
        }
        Err(e) => {
            // A conflict halt owns the worktree now; leave the stash alone.
            if let Some(guard) = guard {
                guard.disarm();
                ui::warning("Your working changes stay stashed; run 'git stash pop' after the restack finishes.");
            }
            Err(e)
        }
    }
}

/// Commits eligible to receive hunks: the current branch and downstack
/// ancestors sharing its effective scope, stopping at trunk or at a scope
/// boundary. Ordered newest-branch-first, commits newest-first; each entry
/// keeps the branch's fork point so rewrites can re-index positions later.
fn build_horizon(
    gateway: &GitGateway,
    graph: &BranchGraph,
    branch: &str,
) -> Result<Vec<(String, String, Vec<(String, String)>)>> {
    let scope = graph.effective_scope(branch);
    let mut chain = graph.downstack(branch)?;
    chain.reverse(); // branch first, oldest ancestor last

    let mut horizon = Vec::new();
    for name in chain {
        if graph.is_trunk(&name) {
            break;
        }
        if graph.effective_scope(&name) != scope {
            debug!(logging::logger(), "absorb horizon stops at scope boundary"; "branch" => &name);
            break;
        }
        let Some(parent) = graph.parent_of(&name).map(|s| s.to_string()) else {
            break;
        };
        let base = gateway.merge_base(&name, &parent)?;
        let mut commits: Vec<(String, String)> = gateway
            .commits_between(base.as_str(), &name)?
            .into_iter()
            .map(|(oid, subject)| (oid.to_string(), subject))
            .collect();
        commits.reverse(); // newest first
        horizon.push((name, base.to_string(), commits));
    }
    Ok(horizon)
}

/// Map every staged hunk to its target commit via blame over the hunk's
/// pre-image range.
fn build_plan(gateway: &GitGateway, graph: &BranchGraph, branch: &str, hunks: Vec<DiffHunk>) -> Result<AbsorbPlan> {
    let horizon = build_horizon(gateway, graph, branch)?;

    // Recency rank and (branch, position, subject) per commit, plus each
    // branch's age (1 = oldest horizon branch) and fork point
    let mut rank: BTreeMap<String, usize> = BTreeMap::new();
    let mut location: BTreeMap<String, (String, usize, String)> = BTreeMap::new();
    let mut branch_age: BTreeMap<String, usize> = BTreeMap::new();
    let mut branch_base: BTreeMap<String, String> = BTreeMap::new();
    let mut next_rank = 0usize;
    for (i, (owner, base, commits)) in horizon.iter().enumerate() {
        branch_age.insert(owner.clone(), horizon.len() - i);
        branch_base.insert(owner.clone(), base.clone());
        let count = commits.len();
        for (newest_idx, (oid, subject)) in commits.iter().enumerate() {
            rank.insert(oid.clone(), next_rank);
            // position is oldest-first within the branch
            location.insert(oid.clone(), (owner.clone(), count - 1 - newest_idx, subject.clone()));
            next_rank += 1;
        }
    }

    let mut groups: BTreeMap<String, TargetGroup> = BTreeMap::new();
    let mut unabsorbed = Vec::new();

    for hunk in hunks {
        if hunk.old_missing {
            // Brand-new file: no ancestor commit touched it
            unabsorbed.push(hunk);
            continue;
        }
        let (start, end) = hunk.old_range();
        let blamed = gateway.blame_range("HEAD", &hunk.file, start, end)?;

        let target = blamed
            .iter()
            .filter(|sha| rank.contains_key(*sha))
            .min_by_key(|sha| rank[*sha])
            .cloned();

        match target {
            Some(oid) => {
                let (owner, position, subject) = location[&oid].clone();
                let age = branch_age.get(&owner).copied().unwrap_or(0);
                let base = branch_base.get(&owner).cloned().unwrap_or_default();
                groups
                    .entry(oid.clone())
                    .or_insert_with(|| TargetGroup {
                        branch: owner,
                        base,
                        position,
                        branch_age: age,
                        commit: oid,
                        subject,
                        hunks: Vec::new(),
                    })
                    .hunks
                    .push(hunk);
            }
            None => unabsorbed.push(hunk),
        }
    }

    // Oldest branch first, oldest position first: the rewrite order
    let mut groups: Vec<TargetGroup> = groups.into_values().collect();
    groups.sort_by_key(|g| (g.branch_age, g.position));

    Ok(AbsorbPlan { groups, unabsorbed })
}

fn print_plan(plan: &AbsorbPlan) {
    for group in &plan.groups {
        ui::step(&format!(
            "{} hunk(s) -> \"{}\" on {}",
            group.hunks.len(),
            group.subject,
            ui::branch_name(&group.branch)
        ));
        for hunk in &group.hunks {
            let (start, end) = hunk.old_range();
            ui::bullet(&format!("{}:{}-{}", hunk.file, start, end));
        }
    }
    for hunk in &plan.unabsorbed {
        let (start, end) = hunk.old_range();
        ui::warning(&format!(
            "{}:{}-{} commutes with every stack commit; left staged",
            hunk.file, start, end
        ));
    }
}

/// Amend each target commit with its hunks and replay the owning branch.
/// Returns the oldest branch whose history was actually rewritten (the
/// minimum branch age seen, not merely the first group processed), which
/// roots the restack that follows.
fn rewrite_targets(gateway: &GitGateway, plan: &AbsorbPlan) -> Result<String> {
    let mut oldest: Option<(usize, String)> = None;

    for group in &plan.groups {
        // The recorded oid survives rewrites of other branches; only a
        // rewrite of this same branch moves it, and then its position over
        // the plan-time fork point finds it again.
        let target_oid = if gateway.is_ancestor(&group.commit, &group.branch)? {
            group.commit.clone()
        } else {
            let commits = gateway.commits_between(&group.base, &group.branch)?;
            match commits.get(group.position) {
                Some((oid, _)) => oid.to_string(),
                None => {
                    return Err(StackError::GitError {
                        cmd: "absorb".into(),
                        stderr: format!(
                            "target position {} vanished from '{}' during rewrite",
                            group.position, group.branch
                        ),
                        code: 1,
                    }
                    .into())
                }
            }
        };

        debug!(logging::logger(), "absorb rewrite";
            "branch" => &group.branch, "target" => &target_oid, "hunks" => group.hunks.len());

        gateway.checkout_detached(&target_oid)?;

        let patch = group_patch(&group.hunks);
        if let Err(e) = gateway.apply_patch(&patch, false, true) {
            return Err(anyhow::anyhow!(
                "Could not apply hunk(s) to \"{}\" ({}): {}",
                group.subject,
                &target_oid[..7.min(target_oid.len())],
                e
            ));
        }
        gateway.amend_commit(None, false)?;
        let amended = gateway.rev_parse("HEAD")?.to_string();

        // Replay the rest of the branch onto the amended commit
        let outcome = gateway.rebase_onto(&target_oid, &group.branch, &amended)?;
        if outcome.has_conflicts() {
            gateway.rebase_abort()?;
            anyhow::bail!(
                "Replaying '{}' over the amended \"{}\" conflicted; absorb rolled back",
                group.branch,
                group.subject
            );
        }

        if oldest.as_ref().map(|(age, _)| group.branch_age < *age).unwrap_or(true) {
            oldest = Some((group.branch_age, group.branch.clone()));
        }
    }

    Ok(oldest.expect("rewrite_targets called with no groups").1)
}

/// Render a group's hunks as one patch document, file by file in parsed
/// order.
fn group_patch(hunks: &[DiffHunk]) -> String {
    let mut by_file: Vec<(&str, Vec<&DiffHunk>)> = Vec::new();
    for hunk in hunks {
        match by_file.iter_mut().find(|(file, _)| *file == hunk.file) {
            Some((_, list)) => list.push(hunk),
            None => by_file.push((&hunk.file, vec![hunk])),
        }
    }
    by_file
        .into_iter()
        .map(|(file, list)| render_patch(file, list[0].old_missing, list[0].new_missing, &list))
        .collect()
}

/// Put hunks nobody claimed back into the index so they are not lost.
fn restage_unabsorbed(gateway: &GitGateway, hunks: &[DiffHunk]) -> Result<()> {
    let patch = group_patch(hunks);
    if let Err(e) = gateway.apply_patch(&patch, false, true) {
        ui::warning(&format!(
            "Could not restage unabsorbed hunk(s): {}. They remain in the undo snapshot.",
            e
        ));
    }
    Ok(())
}
