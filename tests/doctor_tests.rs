mod common;

use anyhow::Result;
use common::*;
use serde_json::json;
use std::process::{Command, Stdio};
use tempfile::TempDir;

#[test]
fn test_doctor_clean_repo_passes() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;

    let output = stackit_ok(dir.path(), &["doctor"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Everything checks out"), "stdout: {}", stdout);
    Ok(())
}

#[test]
fn test_doctor_reports_and_prunes_orphaned_metadata() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;
    write_metadata(dir.path(), "ghost", &json!({"parentBranchName": "main"}))?;

    // Report without --fix
    let output = stackit_ok(dir.path(), &["doctor"])?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ghost"), "stderr: {}", stderr);
    assert!(read_metadata(dir.path(), "ghost")?.is_some());

    // Prune with --fix
    stackit_ok(dir.path(), &["doctor", "--fix"])?;
    assert!(read_metadata(dir.path(), "ghost")?.is_none());
    Ok(())
}

#[test]
fn test_doctor_reports_corrupt_metadata_without_fixing() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;

    // Point a's metadata ref at a non-JSON blob
    let mut child = Command::new("git")
        .args(["hash-object", "-w", "--stdin"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    use std::io::Write;
    child.stdin.as_mut().unwrap().write_all(b"{ definitely not json")?;
    let out = child.wait_with_output()?;
    let oid = String::from_utf8_lossy(&out.stdout).trim().to_string();
    git_stdout(dir.path(), &["update-ref", "refs/stackit/metadata/a", &oid])?;

    let output = stackit_ok(dir.path(), &["doctor", "--fix"])?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("corrupt"), "stderr: {}", stderr);

    // --fix must not touch corrupt payloads
    let raw = git_stdout(dir.path(), &["rev-parse", "refs/stackit/metadata/a"])?;
    assert_eq!(raw, oid, "corrupt payload left for manual repair");
    Ok(())
}

#[test]
fn test_doctor_reports_cycles_with_path() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["x", "y"])?;

    // Fabricate a cycle directly in the payloads
    write_metadata(dir.path(), "x", &json!({"parentBranchName": "y"}))?;
    write_metadata(dir.path(), "y", &json!({"parentBranchName": "x"}))?;

    let output = stackit_ok(dir.path(), &["doctor"])?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cycle"), "stderr: {}", stderr);
    assert!(stderr.contains("x") && stderr.contains("y"), "path shown: {}", stderr);
    Ok(())
}

#[test]
fn test_uninitialized_repo_fails_with_hint() -> Result<()> {
    let dir = TempDir::new()?;
    git(dir.path(), &["init"])?;
    git(dir.path(), &["config", "user.name", "Test User"])?;
    git(dir.path(), &["config", "user.email", "test@example.com"])?;
    std::fs::write(dir.path().join("f.txt"), "f\n")?;
    git(dir.path(), &["add", "."])?;
    git(dir.path(), &["commit", "-m", "init"])?;

    let output = stackit(dir.path(), &["restack"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("stackit init"), "hint shown: {}", stderr);
    Ok(())
}

#[test]
fn test_unknown_metadata_keys_survive_tool_operations() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a", "b"])?;

    // A future version left an extra key on b's payload
    write_metadata(
        dir.path(),
        "b",
        &json!({"parentBranchName": "a", "futureFlag": {"x": 1}}),
    )?;

    // Deleting a rewrites b's payload (reparent onto main)
    stackit_ok(dir.path(), &["delete", "a", "--force"])?;

    let meta = read_metadata(dir.path(), "b")?.unwrap();
    assert_eq!(meta["parentBranchName"], "main");
    assert_eq!(meta["futureFlag"]["x"], 1, "unknown keys preserved: {}", meta);
    Ok(())
}
