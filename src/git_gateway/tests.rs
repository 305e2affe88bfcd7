//! Gateway unit tests against throwaway repositories.

use anyhow::Result;
use tempfile::tempdir;

use crate::git_backend::ExpectedRef;
use crate::test_context::{init_test_repo, TestRepoContext};

use super::GitGateway;

fn commit_file(repo_path: &std::path::Path, gateway: &GitGateway, name: &str, content: &str, msg: &str) -> Result<()> {
    std::fs::write(repo_path.join(name), content)?;
    gateway.stage_all()?;
    gateway.commit(msg)?;
    Ok(())
}

#[test]
fn test_branch_create_and_tip() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    gateway.create_branch_at("feature", "main")?;
    assert!(gateway.branch_exists("feature")?);
    assert_eq!(gateway.branch_tip("feature")?, gateway.branch_tip("main")?);
    Ok(())
}

#[test]
fn test_blob_ref_write_and_read() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    let blob = gateway.write_blob_ref("refs/stackit/metadata/feature", b"{\"parentBranchName\":\"main\"}", &ExpectedRef::Any)?;

    let target = gateway.read_ref("refs/stackit/metadata/feature")?.unwrap();
    assert_eq!(target, blob);
    let content = gateway.read_blob(&target)?;
    assert_eq!(content, b"{\"parentBranchName\":\"main\"}");
    Ok(())
}

#[test]
fn test_write_ref_cas_rejects_stale_expectation() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    let first = gateway.write_blob_ref("refs/stackit/metadata/b", b"one", &ExpectedRef::Any)?;
    let second = gateway.hash_object(b"two")?;
    let third = gateway.hash_object(b"three")?;

    // CAS against the real current value succeeds
    gateway.write_ref("refs/stackit/metadata/b", &second, &ExpectedRef::Current(first.clone()))?;
    // CAS against a stale value is refused
    let result = gateway.write_ref("refs/stackit/metadata/b", &third, &ExpectedRef::Current(first));
    assert!(result.is_err());

    assert_eq!(gateway.read_ref("refs/stackit/metadata/b")?.unwrap(), second);
    Ok(())
}

#[test]
fn test_delete_ref_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    gateway.write_blob_ref("refs/stackit/metadata/gone", b"x", &ExpectedRef::Any)?;
    gateway.delete_ref("refs/stackit/metadata/gone")?;
    gateway.delete_ref("refs/stackit/metadata/gone")?;
    assert!(gateway.read_ref("refs/stackit/metadata/gone")?.is_none());
    Ok(())
}

#[test]
fn test_commits_between_orders_oldest_first() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    let base = gateway.branch_tip("main")?;
    commit_file(dir.path(), &gateway, "a.txt", "a", "first")?;
    commit_file(dir.path(), &gateway, "b.txt", "b", "second")?;

    let commits = gateway.commits_between(base.as_str(), "HEAD")?;
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].1, "first");
    assert_eq!(commits[1].1, "second");
    Ok(())
}

#[test]
fn test_rebase_onto_is_noop_when_up_to_date() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    gateway.create_and_checkout_branch("feature")?;
    commit_file(dir.path(), &gateway, "f.txt", "f", "feature work")?;
    let tip_before = gateway.branch_tip("feature")?;

    let base = gateway.merge_base("feature", "main")?;
    let outcome = gateway.rebase_onto(base.as_str(), "feature", "main")?;
    assert!(!outcome.has_conflicts());
    assert_eq!(gateway.branch_tip("feature")?, tip_before);
    Ok(())
}

#[test]
fn test_stash_guard_restores_on_drop() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    commit_file(dir.path(), &gateway, "tracked.txt", "v1", "add tracked")?;
    std::fs::write(dir.path().join("tracked.txt"), "v2-dirty")?;

    {
        let _guard = super::StashGuard::push(&gateway, "test-stash")?;
        let content = std::fs::read_to_string(dir.path().join("tracked.txt"))?;
        assert_eq!(content, "v1");
    }

    let content = std::fs::read_to_string(dir.path().join("tracked.txt"))?;
    assert_eq!(content, "v2-dirty");
    Ok(())
}

#[test]
fn test_staged_hunks_report_file_and_range() -> Result<()> {
    let dir = tempdir()?;
    let _repo = init_test_repo(dir.path())?;
    let _ctx = TestRepoContext::new(dir.path());

    let gateway = GitGateway::new()?;
    let body = (1..=10).map(|i| format!("line {}\n", i)).collect::<String>();
    commit_file(dir.path(), &gateway, "code.txt", &body, "ten lines")?;

    let edited = body.replace("line 4\n", "line 4 edited\n");
    std::fs::write(dir.path().join("code.txt"), edited)?;
    gateway.stage_all()?;

    let diff = gateway.diff_staged_hunks()?;
    assert_eq!(diff.hunks.len(), 1);
    let hunk = &diff.hunks[0];
    assert_eq!(hunk.file, "code.txt");
    let (start, end) = hunk.old_range();
    assert!(start <= 4 && 4 <= end, "range {:?} should cover line 4", (start, end));
    Ok(())
}
