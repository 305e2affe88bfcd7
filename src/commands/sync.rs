//! Sync: reconcile the local graph with the PR host, then restack.
//!
//! Merged and closed PRs are deleted locally with grandparent adoption, a
//! PR whose base moved drags its branch onto the new parent, and the
//! surviving stack is restacked onto the freshly fast-forwarded trunk.
//! The cleanup decision itself is a pure function over the PR states, so
//! it is unit-testable without a host.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::errors::StackError;
use crate::forge::{self, Forge, PrState, RemotePr};
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::{MetadataStore, PrInfo};
use crate::state::{acquire_operation_lock, Continuation, OperationKind};
use crate::ui;
use crate::validation::{prune_orphaned_metadata, repair_orphaned_branches};

use super::{current_argv, restack, take_snapshot};

/// The branch facts the cleanup planner consumes.
#[derive(Debug, Clone)]
pub struct BranchFacts {
    pub parent: Option<String>,
    pub pr: Option<RemotePr>,
    pub consolidation: bool,
    /// For a consolidation branch: the tracked branches it actually
    /// carries (their tips are ancestors of its own tip). Empty otherwise.
    pub carries: Vec<String>,
}

/// What sync decided to do, before touching anything.
#[derive(Debug, Default, PartialEq)]
pub struct CleanupPlan {
    /// Branches to delete, with the reason shown to the user.
    pub deletions: Vec<(String, String)>,
    /// Branch -> new parent, from PR base changes.
    pub reparents: Vec<(String, String)>,
}

/// Name prefix that marks a consolidation branch when the payload flag is
/// absent (older layouts).
const CONSOLIDATION_PREFIX: &str = "combined/";

pub async fn run(force: bool, no_restack: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    if gateway.has_staged_or_modified_changes()? {
        return Err(StackError::UncommittedChanges.into());
    }

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let trunk = config.require_trunk()?;

    if ExecutionContext::is_dry_run() {
        return dry_run(&gateway, &store, &config, &trunk);
    }

    let original_branch = gateway.current_branch()?;
    let snapshot = take_snapshot(&gateway, &store, &config, "sync")?;

    // Bring trunk up to date first; failures are warnings, not fatal
    let spin = ui::spinner(&format!("Fetching from {}...", gateway.remote()));
    match gateway.fetch() {
        Ok(()) => ui::spinner_success(spin, &format!("Fetched from {}", gateway.remote())),
        Err(e) => ui::spinner_warning(spin, &format!("Could not fetch: {}", e)),
    }
    for t in &config.trunks {
        if let Err(e) = gateway.fast_forward_branch(t) {
            ui::warning(&format!("Could not fast-forward {}: {}", t, e));
        }
    }

    let mut graph = BranchGraph::load(&gateway, &store, &config)?;
    repair_orphaned_branches(&mut graph, &trunk)?;
    for pruned in prune_orphaned_metadata(&gateway, &store, &config.trunks)? {
        ui::warning(&format!("Pruned metadata for deleted branch '{}'", pruned));
    }

    // Refresh PR info from the host; per-branch failures are collected
    let graph = BranchGraph::load(&gateway, &store, &config)?;
    let tracked: Vec<String> = graph.tracked_branches().iter().map(|b| b.name.clone()).collect();

    let mut remote_prs: BTreeMap<String, RemotePr> = BTreeMap::new();
    match forge::detect(&gateway) {
        Ok(forge_impl) => {
            if let Err(e) = forge_impl.check_auth() {
                ui::warning(&format!("Skipping PR reconciliation: {}", e));
            } else {
                remote_prs = query_prs(forge_impl.as_ref(), &tracked).await;
            }
        }
        Err(e) => {
            ui::warning(&format!("No PR host available ({:#}); local cleanup only", e));
        }
    }

    // Persist the refreshed PR info
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;
    for (branch, pr) in &remote_prs {
        let tip = gateway.branch_tip(branch).ok().map(|o| o.to_string());
        graph.update_pr_info(
            branch,
            Some(PrInfo {
                number: pr.number,
                state: pr.state,
                base: pr.base.clone(),
                url: pr.url.clone(),
                head_sha: tip,
            }),
        )?;
    }

    let facts = collect_facts(&gateway, &graph, &remote_prs);
    let plan = plan_cleanup(&facts, &trunk, config.sync.delete_closed);

    if plan.deletions.is_empty() && plan.reparents.is_empty() {
        ui::success("Local graph matches the PR host");
    } else {
        apply_plan(&gateway, &mut graph, &plan, &trunk, force)?;
    }

    if no_restack {
        ui::success_bold("Sync complete (no restack)");
        checkout_back(&gateway, &original_branch, &trunk)?;
        return Ok(());
    }

    // Restack every surviving tracked branch, ancestors first
    let graph = BranchGraph::load(&gateway, &store, &config)?;
    let survivors: Vec<String> = graph.tracked_branches().iter().map(|b| b.name.clone()).collect();
    let queue = graph.topo_sort(&survivors);
    drop(graph);

    if queue.is_empty() {
        ui::success_bold("Sync complete");
        checkout_back(&gateway, &original_branch, &trunk)?;
        return Ok(());
    }

    let continuation = Continuation::new(
        OperationKind::Sync,
        queue,
        current_argv(),
        snapshot.id,
        if gateway.branch_exists(&original_branch)? {
            original_branch
        } else {
            trunk.clone()
        },
    );
    restack::run_sequence(&gateway, &store, &config, continuation)?;
    ui::success_bold("Sync complete");
    Ok(())
}

fn dry_run(gateway: &GitGateway, store: &MetadataStore, config: &Config, trunk: &str) -> Result<()> {
    let graph = BranchGraph::load(gateway, store, config)?;
    let tracked: Vec<String> = graph.tracked_branches().iter().map(|b| b.name.clone()).collect();
    ui::step("Dry run - would perform:");
    ui::bullet(&format!("Fetch from {} and fast-forward {}", gateway.remote(), trunk));
    ui::bullet(&format!("Reconcile {} tracked branch(es) with the PR host", tracked.len()));
    ui::bullet("Restack surviving branches in dependency order");
    Ok(())
}

async fn query_prs(forge_impl: &dyn Forge, branches: &[String]) -> BTreeMap<String, RemotePr> {
    let spin = ui::spinner(&format!("Checking {} PR(s)...", branches.len()));
    let results = forge_impl.prs_for_branches(branches).await;
    spin.finish_and_clear();

    let mut found = BTreeMap::new();
    for (branch, result) in results {
        match result {
            Ok(Some(pr)) => {
                found.insert(branch, pr);
            }
            Ok(None) => {}
            Err(e) => ui::warning(&format!("Could not load PR for '{}': {:#}", branch, e)),
        }
    }
    found
}

fn collect_facts(
    gateway: &GitGateway,
    graph: &BranchGraph,
    remote_prs: &BTreeMap<String, RemotePr>,
) -> BTreeMap<String, BranchFacts> {
    let tracked = graph.tracked_branches();
    tracked
        .iter()
        .map(|b| {
            let pr = remote_prs.get(&b.name).cloned().or_else(|| {
                // Fall back to the stored payload when the host was silent
                b.pr_info.as_ref().map(|stored| RemotePr {
                    number: stored.number,
                    state: stored.state,
                    base: stored.base.clone(),
                    url: stored.url.clone(),
                })
            });
            let consolidation = b.consolidation || b.name.starts_with(CONSOLIDATION_PREFIX);
            // A consolidation branch carries exactly the branches whose
            // tips its own history contains
            let carries = if consolidation {
                tracked
                    .iter()
                    .filter(|other| other.name != b.name)
                    .filter(|other| gateway.is_ancestor(&other.name, &b.name).unwrap_or(false))
                    .map(|other| other.name.clone())
                    .collect()
            } else {
                Vec::new()
            };
            (
                b.name.clone(),
                BranchFacts {
                    parent: b.parent.clone(),
                    pr,
                    consolidation,
                    carries,
                },
            )
        })
        .collect()
}

/// Decide deletions and re-parentings from the PR states alone.
pub fn plan_cleanup(facts: &BTreeMap<String, BranchFacts>, trunk: &str, delete_closed: bool) -> CleanupPlan {
    let mut plan = CleanupPlan::default();
    let mut doomed: BTreeSet<String> = BTreeSet::new();

    for (branch, f) in facts {
        let Some(pr) = &f.pr else { continue };
        match pr.state {
            PrState::Merged => {
                doomed.insert(branch.clone());
                plan.deletions.push((branch.clone(), format!("PR #{} merged", pr.number)));
            }
            PrState::Closed if delete_closed => {
                doomed.insert(branch.clone());
                plan.deletions.push((branch.clone(), format!("PR #{} closed", pr.number)));
            }
            PrState::Closed => {}
            PrState::Open => {
                // Follow a base change on the host, unless the recorded
                // parent is merely being deleted (adoption handles that)
                let parent = f.parent.as_deref().unwrap_or(trunk);
                if pr.base != parent && !doomed.contains(parent) {
                    let new_parent = if pr.base == trunk || !facts.contains_key(&pr.base) {
                        trunk.to_string()
                    } else {
                        pr.base.clone()
                    };
                    if new_parent != parent {
                        plan.reparents.push((branch.clone(), new_parent));
                    }
                }
            }
        }
    }

    // A consolidation branch goes away with the PRs it carried; it must
    // never survive as an adopted ancestor. Only the branches it actually
    // carries have a say: a merge in an unrelated stack is not its cue.
    for (branch, f) in facts {
        if f.consolidation && !doomed.contains(branch) {
            let carried_merged = f.carries.iter().any(|name| {
                facts
                    .get(name)
                    .and_then(|other| other.pr.as_ref())
                    .is_some_and(|pr| pr.state == PrState::Merged)
            });
            if carried_merged {
                doomed.insert(branch.clone());
                plan.deletions
                    .push((branch.clone(), "consolidation branch no longer needed".into()));
            }
        }
    }

    // Drop reparents targeting a branch that is itself being deleted
    plan.reparents.retain(|(_, target)| !doomed.contains(target));
    plan
}

fn apply_plan(
    gateway: &GitGateway,
    graph: &mut BranchGraph,
    plan: &CleanupPlan,
    trunk: &str,
    force: bool,
) -> Result<()> {
    if !plan.deletions.is_empty() {
        ui::step(&format!("{} branch(es) to clean up:", plan.deletions.len()));
        for (branch, reason) in &plan.deletions {
            ui::bullet(&format!("{} ({})", branch, reason));
        }
        if !ui::confirm("Delete these branches?", force)? {
            anyhow::bail!("Aborted.");
        }
    }

    // Step off a branch that is about to be deleted
    if let Ok(current) = gateway.current_branch() {
        if plan.deletions.iter().any(|(b, _)| b == &current) {
            gateway.checkout_branch(trunk)?;
        }
    }

    // Grandparent adoption is transitive through graph.delete: deleting in
    // topo order resolves chains inside the deletion set.
    let doomed: Vec<String> = plan.deletions.iter().map(|(b, _)| b.clone()).collect();
    for branch in graph.topo_sort(&doomed) {
        graph.delete(&branch, true)?;
        ui::success(&format!("Deleted {}", branch));
    }

    for (branch, new_parent) in &plan.reparents {
        graph.set_parent(branch, new_parent)?;
        ui::success(&format!("Re-parented {} onto {}", branch, new_parent));
    }
    Ok(())
}

fn checkout_back(gateway: &GitGateway, original: &str, trunk: &str) -> Result<()> {
    if gateway.branch_exists(original)? {
        gateway.checkout_branch(original)?;
    } else {
        ui::step(&format!("'{}' was cleaned up; staying on {}", original, trunk));
        gateway.checkout_branch(trunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(parent: &str, state: Option<PrState>, base: &str) -> BranchFacts {
        BranchFacts {
            parent: Some(parent.to_string()),
            pr: state.map(|s| RemotePr {
                number: 1,
                state: s,
                base: base.to_string(),
                url: "u".into(),
            }),
            consolidation: false,
            carries: Vec::new(),
        }
    }

    fn consolidation(parent: &str, carries: &[&str]) -> BranchFacts {
        let mut f = facts(parent, Some(PrState::Open), parent);
        f.consolidation = true;
        f.carries = carries.iter().map(|s| s.to_string()).collect();
        f
    }

    #[test]
    fn test_merged_pr_is_deleted() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Merged), "main"));
        map.insert("b".to_string(), facts("a", Some(PrState::Open), "a"));

        let plan = plan_cleanup(&map, "main", true);
        assert_eq!(plan.deletions.len(), 1);
        assert_eq!(plan.deletions[0].0, "a");
        // b's base still names a (being deleted): adoption handles it, no reparent
        assert!(plan.reparents.is_empty());
    }

    #[test]
    fn test_closed_pr_respects_toggle() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Closed), "main"));

        let plan = plan_cleanup(&map, "main", true);
        assert_eq!(plan.deletions.len(), 1);

        let plan = plan_cleanup(&map, "main", false);
        assert!(plan.deletions.is_empty());
    }

    #[test]
    fn test_base_change_reparents_onto_new_base() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Open), "main"));
        map.insert("b".to_string(), facts("a", Some(PrState::Open), "main"));

        // b's PR base moved to main but its recorded parent is a
        let plan = plan_cleanup(&map, "main", true);
        assert!(plan.deletions.is_empty());
        assert_eq!(plan.reparents, vec![("b".to_string(), "main".to_string())]);
    }

    #[test]
    fn test_base_change_to_unknown_branch_falls_back_to_trunk() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), facts("a", Some(PrState::Open), "release-queue"));

        let plan = plan_cleanup(&map, "main", true);
        assert_eq!(plan.reparents, vec![("b".to_string(), "main".to_string())]);
    }

    #[test]
    fn test_branch_without_pr_is_untouched() {
        let mut map = BTreeMap::new();
        map.insert("wip".to_string(), facts("main", None, ""));

        let plan = plan_cleanup(&map, "main", true);
        assert!(plan.deletions.is_empty());
        assert!(plan.reparents.is_empty());
    }

    #[test]
    fn test_consolidation_branch_deleted_with_individuals() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Merged), "main"));
        map.insert("combined-release".to_string(), consolidation("main", &["a"]));

        let plan = plan_cleanup(&map, "main", true);
        let deleted: Vec<&str> = plan.deletions.iter().map(|(b, _)| b.as_str()).collect();
        assert!(deleted.contains(&"a"));
        assert!(deleted.contains(&"combined-release"));
    }

    #[test]
    fn test_consolidation_ignores_merges_in_unrelated_stacks() {
        // Two independent stacks, each with its own consolidation branch.
        // Stack one's merge must only take stack one's consolidation along.
        let mut map = BTreeMap::new();
        map.insert("one-a".to_string(), facts("main", Some(PrState::Merged), "main"));
        map.insert("one-combined".to_string(), consolidation("main", &["one-a"]));
        map.insert("two-a".to_string(), facts("main", Some(PrState::Open), "main"));
        map.insert("two-combined".to_string(), consolidation("main", &["two-a"]));

        let plan = plan_cleanup(&map, "main", true);
        let deleted: Vec<&str> = plan.deletions.iter().map(|(b, _)| b.as_str()).collect();
        assert!(deleted.contains(&"one-a"));
        assert!(deleted.contains(&"one-combined"));
        assert!(
            !deleted.contains(&"two-combined"),
            "an unrelated merge must not delete another stack's consolidation branch: {:?}",
            deleted
        );
        assert!(!deleted.contains(&"two-a"));
    }

    #[test]
    fn test_consolidation_carrying_nothing_survives() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Merged), "main"));
        map.insert("empty-combined".to_string(), consolidation("main", &[]));

        let plan = plan_cleanup(&map, "main", true);
        assert!(!plan.deletions.iter().any(|(b, _)| b == "empty-combined"));
    }

    #[test]
    fn test_reparent_onto_doomed_branch_is_dropped() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), facts("main", Some(PrState::Merged), "main"));
        // c's PR base points at a, which is being deleted: adoption wins
        map.insert("c".to_string(), facts("b", Some(PrState::Open), "a"));

        let plan = plan_cleanup(&map, "main", true);
        assert_eq!(plan.deletions.len(), 1);
        assert!(plan.reparents.is_empty());
    }
}
