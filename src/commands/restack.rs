//! Restack: rebase descendants onto their parents' current tips.
//!
//! The sequence engine here is shared by `restack`, `sync`, `absorb` and
//! `continue`: process a topo-ordered queue one branch at a time, and on a
//! conflict persist a continuation and stop. Everything needed to resume
//! lives in the continuation file, so `stackit continue` works from a
//! fresh process.

use anyhow::Result;
use slog::debug;

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::errors::StackError;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::logging;
use crate::meta::MetadataStore;
use crate::state::{acquire_operation_lock, Continuation, OperationKind};
use crate::ui;
use crate::validation::repair_orphaned_branches;

use super::{current_argv, take_snapshot};

pub fn run(branch: Option<String>, only: bool, upstack: bool, downstack: bool) -> Result<()> {
    let _lock = acquire_operation_lock()?;

    let gateway = GitGateway::new()?;
    gateway.ensure_no_operation_in_progress()?;
    gateway.require_clean_for_rebase()?;

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let trunk = config.require_trunk()?;
    let mut graph = BranchGraph::load(&gateway, &store, &config)?;

    repair_orphaned_branches(&mut graph, &trunk)?;

    let original_branch = gateway.current_branch()?;
    let start = branch.unwrap_or_else(|| original_branch.clone());

    if graph.is_trunk(&start) {
        return Err(StackError::TrunkRefusal {
            branch: start,
            action: "restack",
        }
        .into());
    }
    graph.require_tracked(&start)?;

    let queue: Vec<String> = if only {
        vec![start.clone()]
    } else if downstack {
        graph.downstack(&start)?
    } else if upstack {
        graph.upstack(&start)?
    } else {
        // Default: the branch and everything stacked on it
        graph.upstack(&start)?
    };

    let queue = graph.topo_sort(&queue);

    if ExecutionContext::is_dry_run() {
        ui::step(&format!("Dry run - would restack {} branch(es):", queue.len()));
        for name in &queue {
            let onto = graph.parent_of(name).unwrap_or(&trunk);
            ui::bullet(&format!("{} onto {}", ui::branch_name(name), onto));
        }
        return Ok(());
    }

    let snapshot = take_snapshot(&gateway, &store, &config, "restack")?;
    let continuation = Continuation::new(
        OperationKind::Restack,
        queue,
        current_argv(),
        snapshot.id,
        original_branch,
    );
    run_sequence(&gateway, &store, &config, continuation)
}

/// Drive a restack queue to completion or to a conflict halt.
///
/// On a halt the continuation (with the remaining queue) is persisted and
/// `ConflictHalt` is returned; on success the user is returned to the
/// branch the sequence started from.
pub fn run_sequence(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    mut continuation: Continuation,
) -> Result<()> {
    let trunk = config.require_trunk()?;
    let total = continuation.completed.len() + continuation.queue.len();

    while !continuation.queue.is_empty() {
        let branch = continuation.queue.remove(0);
        continuation.current_branch = Some(branch.clone());
        let done = continuation.completed.len();

        if !gateway.branch_exists(&branch)? {
            ui::warning(&format!("Skipping '{}': branch no longer exists", branch));
            continuation.completed.push(branch);
            continue;
        }

        let onto = store
            .get(&branch)?
            .and_then(|m| m.parent_branch_name)
            .unwrap_or_else(|| trunk.clone());

        if !gateway.branch_exists(&onto)? {
            ui::warning(&format!("Skipping '{}': parent '{}' does not exist", branch, onto));
            continuation.completed.push(branch);
            continue;
        }

        if gateway.is_branch_based_on(&branch, &onto)? {
            ui::success(&format!(
                "[{}/{}] {} already on {}",
                done + 1,
                total,
                branch,
                onto
            ));
            continuation.completed.push(branch);
            continue;
        }

        ui::step(&format!(
            "[{}/{}] Restacking {} onto {}",
            done + 1,
            total,
            ui::branch_name(&branch),
            onto
        ));

        let upstream = determine_upstream(gateway, store, &branch, &onto)?;
        debug!(logging::logger(), "rebase";
            "branch" => &branch, "onto" => &onto, "upstream" => &upstream);

        // Persist before the rebase so a crash mid-rebase is resumable
        continuation.save()?;

        let outcome = gateway.rebase_onto(&upstream, &branch, &onto)?;
        if outcome.has_conflicts() {
            ui::display_conflict_halt(gateway, &branch, &onto, &continuation.queue);
            continuation.save()?;
            return Err(StackError::ConflictHalt(branch).into());
        }

        record_synced_head(gateway, store, &branch)?;
        continuation.completed.push(branch);
    }

    Continuation::clear()?;

    if gateway.branch_exists(&continuation.original_branch)? {
        gateway.checkout_branch(&continuation.original_branch)?;
    }
    ui::success_bold("Restack complete");
    Ok(())
}

/// The upstream (old fork point) for rebasing `branch` onto `onto`.
///
/// The parent's recorded synced head is used when it still resolves and is
/// an ancestor of the branch; otherwise the fork point is auto-discovered,
/// preferring the parent's reflog (`merge-base --fork-point`) over the
/// plain merge base. The reflog path is what makes restack survive parents
/// amended or rewritten outside this tool: the plain merge base would reach
/// back past the rewrite and replay the parent's old commits.
pub fn determine_upstream(
    gateway: &GitGateway,
    store: &MetadataStore,
    branch: &str,
    parent: &str,
) -> Result<String> {
    if let Some(meta) = store.get(parent)? {
        if let Some(sha) = meta.pr_info.as_ref().and_then(|pr| pr.head_sha.clone()) {
            if gateway.rev_parse(&sha).is_ok() && gateway.is_ancestor(&sha, branch).unwrap_or(false) {
                return Ok(sha);
            }
        }
    }
    if let Some(fork) = gateway.merge_base_fork_point(parent, branch)? {
        return Ok(fork.to_string());
    }
    Ok(gateway.merge_base(branch, parent)?.to_string())
}

/// After a successful rebase, refresh the branch's own synced-head
/// bookkeeping so later upstream discovery can use it.
fn record_synced_head(gateway: &GitGateway, store: &MetadataStore, branch: &str) -> Result<()> {
    let Some(mut meta) = store.get(branch)? else {
        return Ok(());
    };
    if let Some(pr) = meta.pr_info.as_mut() {
        pr.head_sha = Some(gateway.branch_tip(branch)?.to_string());
        store.set(branch, &meta)?;
    }
    Ok(())
}

/// Restack every branch stacked on `parent` (used after modify/squash/fold).
pub fn restack_descendants(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    graph: &BranchGraph,
    parent: &str,
    snapshot_id: &str,
) -> Result<()> {
    let queue = graph.descendants(parent)?;
    if queue.is_empty() {
        return Ok(());
    }
    let continuation = Continuation::new(
        OperationKind::Restack,
        graph.topo_sort(&queue),
        current_argv(),
        snapshot_id.to_string(),
        gateway.current_branch().unwrap_or_else(|_| parent.to_string()),
    );
    run_sequence(gateway, store, config, continuation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{BranchMetadata, PrInfo, PrState};
    use crate::test_context::{init_test_repo, TestRepoContext};
    use tempfile::tempdir;

    fn commit_file(dir: &std::path::Path, gateway: &GitGateway, name: &str, content: &str, msg: &str) -> Result<()> {
        std::fs::write(dir.join(name), content)?;
        gateway.stage_all()?;
        gateway.commit(msg)?;
        Ok(())
    }

    #[test]
    fn test_determine_upstream_discovers_fork_without_metadata() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        gateway.create_and_checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a.txt", "a", "a work")?;
        gateway.create_and_checkout_branch("b")?;
        commit_file(dir.path(), &gateway, "b.txt", "b", "b work")?;

        store.set("a", &BranchMetadata::with_parent("main"))?;
        store.set("b", &BranchMetadata::with_parent("a"))?;

        // No synced-head metadata anywhere: discovery finds the fork point
        let upstream = determine_upstream(&gateway, &store, "b", "a")?;
        assert_eq!(upstream, gateway.merge_base("b", "a")?.to_string());
        Ok(())
    }

    #[test]
    fn test_determine_upstream_uses_reflog_after_parent_amend() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        gateway.create_and_checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a.txt", "a", "a work")?;
        let old_a_tip = gateway.branch_tip("a")?.to_string();
        gateway.create_and_checkout_branch("b")?;
        commit_file(dir.path(), &gateway, "b.txt", "b", "b work")?;

        store.set("a", &BranchMetadata::with_parent("main"))?;
        store.set("b", &BranchMetadata::with_parent("a"))?;

        // Rewrite a's history out from under b
        gateway.checkout_branch("a")?;
        std::fs::write(dir.path().join("a.txt"), "a amended")?;
        gateway.stage_all()?;
        gateway.amend_commit(None, false)?;
        gateway.checkout_branch("b")?;

        // The reflog still knows where b forked; the plain merge base
        // would reach all the way back to main and replay a's old commit
        let upstream = determine_upstream(&gateway, &store, "b", "a")?;
        assert_eq!(upstream, old_a_tip);
        assert_ne!(upstream, gateway.merge_base("b", "a")?.to_string());
        Ok(())
    }

    #[test]
    fn test_determine_upstream_prefers_recorded_head_when_valid() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        gateway.create_and_checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a.txt", "a", "a work")?;
        let a_tip = gateway.branch_tip("a")?.to_string();
        gateway.create_and_checkout_branch("b")?;
        commit_file(dir.path(), &gateway, "b.txt", "b", "b work")?;

        let mut a_meta = BranchMetadata::with_parent("main");
        a_meta.pr_info = Some(PrInfo {
            number: 1,
            state: PrState::Open,
            base: "main".into(),
            url: "u".into(),
            head_sha: Some(a_tip.clone()),
        });
        store.set("a", &a_meta)?;
        store.set("b", &BranchMetadata::with_parent("a"))?;

        let upstream = determine_upstream(&gateway, &store, "b", "a")?;
        assert_eq!(upstream, a_tip);
        Ok(())
    }

    #[test]
    fn test_determine_upstream_rejects_stale_recorded_head() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;

        gateway.create_and_checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a.txt", "a", "a work")?;
        gateway.create_and_checkout_branch("b")?;
        commit_file(dir.path(), &gateway, "b.txt", "b", "b work")?;

        // Record a head sha that is NOT an ancestor of b (amended elsewhere)
        gateway.checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a2.txt", "a2", "a moved on")?;
        let new_a_tip = gateway.branch_tip("a")?.to_string();

        let mut a_meta = BranchMetadata::with_parent("main");
        a_meta.pr_info = Some(PrInfo {
            number: 1,
            state: PrState::Open,
            base: "main".into(),
            url: "u".into(),
            head_sha: Some(new_a_tip),
        });
        store.set("a", &a_meta)?;
        store.set("b", &BranchMetadata::with_parent("a"))?;

        // The recorded head is not an ancestor of b, so merge base wins
        let upstream = determine_upstream(&gateway, &store, "b", "a")?;
        assert_eq!(upstream, gateway.merge_base("b", "a")?.to_string());
        Ok(())
    }

    #[test]
    fn test_run_sequence_is_idempotent_when_up_to_date() -> Result<()> {
        let dir = tempdir()?;
        let _repo = init_test_repo(dir.path())?;
        let _ctx = TestRepoContext::new(dir.path());

        let gateway = GitGateway::new()?;
        let store = MetadataStore::new()?;
        let config = crate::config::Config {
            trunks: vec!["main".into()],
            naming: Default::default(),
            undo: Default::default(),
            sync: Default::default(),
            remote: "origin".into(),
        };

        gateway.create_and_checkout_branch("a")?;
        commit_file(dir.path(), &gateway, "a.txt", "a", "a work")?;
        store.set("a", &BranchMetadata::with_parent("main"))?;

        let tip = gateway.branch_tip("a")?;
        let continuation = Continuation::new(
            OperationKind::Restack,
            vec!["a".into()],
            vec!["restack".into()],
            "snap".into(),
            "a".into(),
        );
        run_sequence(&gateway, &store, &config, continuation)?;
        assert_eq!(gateway.branch_tip("a")?, tip, "no-op restack must not move the tip");
        Ok(())
    }
}
