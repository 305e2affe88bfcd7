#![allow(dead_code)]
//! Shared helpers for integration tests.
//!
//! Tests spawn the built `stackit` binary against throwaway repositories.
//! Prompts are disabled via `STACKIT_NON_INTERACTIVE` so any path that
//! would block fails fast instead.

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Run stackit in `dir` and return the output.
pub fn stackit(dir: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_stackit"))
        .args(args)
        .current_dir(dir)
        .env("STACKIT_NON_INTERACTIVE", "1")
        .stdin(Stdio::null())
        .output()?)
}

/// Run stackit and fail the test with full output when it exits non-zero.
pub fn stackit_ok(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = stackit(dir, args)?;
    assert!(
        output.status.success(),
        "stackit {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(output)
}

pub fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::new("git").args(args).current_dir(dir).output()?)
}

pub fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = git(dir, args)?;
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Initialize a repo with one commit on `main` and stackit initialized.
pub fn init_test_repo(dir: &Path) -> Result<()> {
    git(dir, &["init"])?;
    git(dir, &["config", "user.name", "Test User"])?;
    git(dir, &["config", "user.email", "test@example.com"])?;
    git(dir, &["config", "core.editor", "true"])?;
    git(dir, &["config", "sequence.editor", "true"])?;

    fs::write(dir.join("README.md"), "# Test Repo\n")?;
    git(dir, &["add", "."])?;
    git(dir, &["commit", "-m", "Initial commit"])?;
    // Normalize the default branch name across environments
    git(dir, &["branch", "-m", "main"])?;

    stackit_ok(dir, &["init", "--trunk", "main"])?;
    Ok(())
}

pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) -> Result<()> {
    if let Some(parent) = Path::new(name).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(dir.join(parent))?;
        }
    }
    fs::write(dir.join(name), content)?;
    git(dir, &["add", "--", name])?;
    git(dir, &["commit", "-m", message])?;
    Ok(())
}

pub fn current_branch(dir: &Path) -> Result<String> {
    git_stdout(dir, &["branch", "--show-current"])
}

pub fn branch_exists(dir: &Path, name: &str) -> Result<bool> {
    let output = git(dir, &["show-ref", "--verify", "--quiet", &format!("refs/heads/{}", name)])?;
    Ok(output.status.success())
}

pub fn tip(dir: &Path, branch: &str) -> Result<String> {
    git_stdout(dir, &["rev-parse", branch])
}

pub fn merge_base(dir: &Path, a: &str, b: &str) -> Result<String> {
    git_stdout(dir, &["merge-base", a, b])
}

/// Read a branch's metadata payload from its ref, if present.
pub fn read_metadata(dir: &Path, branch: &str) -> Result<Option<serde_json::Value>> {
    let refname = format!("refs/stackit/metadata/{}", branch);
    let blob = git(dir, &["rev-parse", &refname])?;
    if !blob.status.success() {
        return Ok(None);
    }
    let oid = String::from_utf8_lossy(&blob.stdout).trim().to_string();
    let content = git_stdout(dir, &["cat-file", "blob", &oid])?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// The recorded parent of a branch, from its payload.
pub fn metadata_parent(dir: &Path, branch: &str) -> Result<Option<String>> {
    Ok(read_metadata(dir, branch)?
        .and_then(|v| v.get("parentBranchName").and_then(|p| p.as_str()).map(|s| s.to_string())))
}

/// Write a raw metadata payload for a branch (for fabricating PR states).
pub fn write_metadata(dir: &Path, branch: &str, payload: &serde_json::Value) -> Result<()> {
    let mut child = Command::new("git")
        .args(["hash-object", "-w", "--stdin"])
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    use std::io::Write;
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(serde_json::to_string(payload)?.as_bytes())?;
    let output = child.wait_with_output()?;
    assert!(output.status.success());
    let oid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    git_stdout(dir, &["update-ref", &format!("refs/stackit/metadata/{}", branch), &oid])?;
    Ok(())
}

/// Build a linear stack main -> names[0] -> names[1] -> ..., one commit
/// per branch touching its own file.
pub fn build_stack(dir: &Path, names: &[&str]) -> Result<()> {
    for name in names {
        fs::write(dir.join(format!("{}.txt", name)), format!("{} content\n", name))?;
        stackit_ok(dir, &["create", name, "-a", "-m", &format!("{} work", name)])?;
    }
    Ok(())
}

pub fn continuation_exists(dir: &Path) -> bool {
    dir.join(".git/.stackit_continue").exists()
}
