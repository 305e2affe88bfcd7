mod common;

use anyhow::Result;
use common::*;
use std::fs;
use tempfile::TempDir;

/// Undo is the inverse of a mutating command: tips and metadata return to
/// their pre-command values byte for byte.
#[test]
fn test_undo_reverses_delete() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a", "b"])?;

    let tips_before = (tip(dir.path(), "a")?, tip(dir.path(), "b")?);
    let meta_before = (
        read_metadata(dir.path(), "a")?.unwrap(),
        read_metadata(dir.path(), "b")?.unwrap(),
    );

    git_stdout(dir.path(), &["checkout", "main"])?;
    stackit_ok(dir.path(), &["delete", "a", "--force"])?;
    assert!(!branch_exists(dir.path(), "a")?);
    assert_eq!(metadata_parent(dir.path(), "b")?.as_deref(), Some("main"));

    stackit_ok(dir.path(), &["undo", "--yes"])?;

    assert!(branch_exists(dir.path(), "a")?);
    assert_eq!(tips_before, (tip(dir.path(), "a")?, tip(dir.path(), "b")?));
    let meta_after = (
        read_metadata(dir.path(), "a")?.unwrap(),
        read_metadata(dir.path(), "b")?.unwrap(),
    );
    assert_eq!(meta_before, meta_after);
    Ok(())
}

#[test]
fn test_undo_reverses_squash() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;
    commit_file(dir.path(), "second.txt", "2\n", "second commit")?;

    let tip_before = tip(dir.path(), "a")?;
    stackit_ok(dir.path(), &["squash", "-m", "squashed"])?;
    assert_ne!(tip(dir.path(), "a")?, tip_before);

    stackit_ok(dir.path(), &["undo", "--yes"])?;
    assert_eq!(tip(dir.path(), "a")?, tip_before);
    let count = git_stdout(dir.path(), &["rev-list", "--count", "main..a"])?;
    assert_eq!(count, "2");
    Ok(())
}

/// A branch created after the snapshot is removed again by the undo.
#[test]
fn test_undo_removes_branch_created_by_command() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;

    fs::write(dir.path().join("x.txt"), "x\n")?;
    stackit_ok(dir.path(), &["create", "newborn", "-a", "-m", "newborn work"])?;
    assert!(branch_exists(dir.path(), "newborn")?);

    stackit_ok(dir.path(), &["undo", "--yes"])?;

    assert!(!branch_exists(dir.path(), "newborn")?);
    assert!(read_metadata(dir.path(), "newborn")?.is_none());
    Ok(())
}

#[test]
fn test_undo_list_shows_commands_newest_first() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;
    git_stdout(dir.path(), &["checkout", "main"])?;
    stackit_ok(dir.path(), &["delete", "a", "--force"])?;

    let output = stackit_ok(dir.path(), &["undo", "--list"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("");
    assert!(first_line.contains("delete"), "newest first: {}", stdout);
    assert!(stdout.contains("create"));
    Ok(())
}

/// Restoring an explicit snapshot id from further back.
#[test]
fn test_undo_specific_snapshot() -> Result<()> {
    let dir = TempDir::new()?;
    init_test_repo(dir.path())?;
    build_stack(dir.path(), &["a"])?;

    // Two more mutations, each with its own snapshot
    commit_file(dir.path(), "m1.txt", "1\n", "first extra")?;
    stackit_ok(dir.path(), &["squash", "-m", "collapse"])?;

    let output = stackit_ok(dir.path(), &["undo", "--list"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Oldest snapshot is the one taken by `create`
    let oldest_id = stdout
        .lines()
        .last()
        .and_then(|l| l.split_whitespace().next())
        .unwrap()
        .to_string();

    stackit_ok(dir.path(), &["undo", "--snapshot", &oldest_id, "--yes"])?;
    // Back to the pre-create world: branch a is gone
    assert!(!branch_exists(dir.path(), "a")?);
    Ok(())
}
