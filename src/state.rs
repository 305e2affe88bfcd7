//! Operation continuation and the process lock.
//!
//! A multi-step operation (restack, sync) that halts on a merge conflict
//! persists a `Continuation` to `<git-dir>/.stackit_continue` and exits.
//! `stackit continue` re-enters from that record in a fresh process;
//! `stackit abort` discards it and restores the pre-operation snapshot.
//! The file exists exactly while an operation is halted.
//!
//! The `OperationLock` (`<git-dir>/stackit/operation.lock`) is an advisory
//! file lock held for the duration of every multi-step write operation, so
//! two stackit processes cannot interleave ref updates.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A dead holder's lock is reclaimed only after this many seconds, to avoid
/// racing a process that just started.
const STALE_LOCK_AGE_SECS: u64 = 300;

const CONTINUE_FILE: &str = ".stackit_continue";

/// Find the repository root by walking up from the current directory.
///
/// Tests resolve through the thread-local `TestRepoContext` instead of the
/// real working directory.
pub fn find_git_root() -> Result<PathBuf> {
    #[cfg(test)]
    if let Some(path) = crate::test_context::test_repo_path() {
        if path.join(".git").exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let mut dir = current_dir.as_path();
    loop {
        if dir.join(".git").exists() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(crate::errors::StackError::NotInRepo.into()),
        }
    }
}

fn stackit_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".git").join("stackit")
}

fn continue_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".git").join(CONTINUE_FILE)
}

/// What kind of multi-step operation was interrupted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Restack,
    Sync,
    Absorb,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restack => write!(f, "restack"),
            Self::Sync => write!(f, "sync"),
            Self::Absorb => write!(f, "absorb"),
        }
    }
}

/// Everything needed to resume a halted operation in a fresh process.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Continuation {
    pub kind: OperationKind,
    /// Branches not yet processed, in order.
    pub queue: Vec<String>,
    /// The branch whose rebase is currently conflicted.
    pub current_branch: Option<String>,
    /// Branches already completed (progress display on resume).
    #[serde(default)]
    pub completed: Vec<String>,
    /// The command line that started the sequence, for messaging.
    pub argv: Vec<String>,
    /// Snapshot taken before the operation began; `abort` restores it.
    pub snapshot_id: String,
    /// Branch to return to once the sequence finishes.
    pub original_branch: String,
}

impl Continuation {
    pub fn new(
        kind: OperationKind,
        queue: Vec<String>,
        argv: Vec<String>,
        snapshot_id: String,
        original_branch: String,
    ) -> Self {
        Self {
            kind,
            queue,
            current_branch: None,
            completed: Vec::new(),
            argv,
            snapshot_id,
            original_branch,
        }
    }

    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&find_git_root()?)
    }

    pub fn load_from(repo_root: &Path) -> Result<Option<Self>> {
        let path = continue_path(repo_root);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read continuation at {:?}", path))?;
        let continuation = serde_json::from_str(&content).with_context(|| {
            format!(
                "Continuation file is corrupted. To recover, delete it:\n  rm {:?}",
                path
            )
        })?;
        Ok(Some(continuation))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&find_git_root()?)
    }

    pub fn save_to(&self, repo_root: &Path) -> Result<()> {
        let path = continue_path(repo_root);
        let content = serde_json::to_string_pretty(self)?;
        let mut file =
            File::create(&path).with_context(|| format!("Failed to create continuation at {:?}", path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .context("Failed to set continuation file permissions")?;
        }

        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn clear() -> Result<()> {
        Self::clear_from(&find_git_root()?)
    }

    pub fn clear_from(repo_root: &Path) -> Result<()> {
        let path = continue_path(repo_root);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Advisory lock preventing concurrent stackit processes.
///
/// Released on drop. The payload is `pid:timestamp` so a crashed holder can
/// be detected and the lock reclaimed.
#[derive(Debug)]
pub struct OperationLock {
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl OperationLock {
    pub fn acquire() -> Result<Self> {
        Self::acquire_from(&find_git_root()?)
    }

    pub fn acquire_from(repo_root: &Path) -> Result<Self> {
        let dir = stackit_dir(repo_root);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let lock_path = dir.join("operation.lock");

        match Self::try_acquire(&lock_path) {
            Ok(lock) => Ok(lock),
            Err(first_error) => {
                if Self::is_stale(&lock_path)? {
                    eprintln!("Cleaning up stale lock from crashed process...");
                    if let Err(e) = fs::remove_file(&lock_path) {
                        eprintln!("Warning: could not remove stale lock: {}", e);
                    }
                    Self::try_acquire(&lock_path)
                } else {
                    Err(first_error)
                }
            }
        }
    }

    fn try_acquire(lock_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(lock_path)
            .with_context(|| format!("Failed to create lock file at {:?}", lock_path))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut writer = file.try_clone()?;
                let timestamp = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                writeln!(writer, "{}:{}", std::process::id(), timestamp)?;
                Ok(Self {
                    file,
                    path: lock_path.to_path_buf(),
                })
            }
            Err(_) => {
                let holder = fs::read_to_string(lock_path).unwrap_or_default();
                let holder_pid = holder.split(':').next().unwrap_or("").trim();
                bail!(
                    "Another stackit operation is in progress{}.\n\n\
                     If this is wrong (e.g. after a crash), delete the lock file:\n  rm {:?}",
                    if holder_pid.is_empty() {
                        String::new()
                    } else {
                        format!(" (PID: {})", holder_pid)
                    },
                    lock_path
                );
            }
        }
    }

    fn is_stale(lock_path: &Path) -> Result<bool> {
        if !lock_path.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(lock_path).unwrap_or_default();
        let parts: Vec<&str> = content.trim().split(':').collect();
        let holder_pid: u32 = parts.first().and_then(|s| s.parse().ok()).unwrap_or(0);
        let lock_timestamp: u64 = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);

        if holder_pid == 0 || is_process_running(holder_pid) {
            return Ok(false);
        }

        if lock_timestamp > 0 {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if now.saturating_sub(lock_timestamp) < STALE_LOCK_AGE_SECS {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // kill(pid, 0) probes for existence without sending a signal
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    // No portable probe; assume alive so we never reclaim a live lock
    true
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire the lock and verify no halted operation is pending.
///
/// When a continuation exists but git has no rebase in progress (the user
/// ran `git rebase --abort` directly), the stale record is cleared with a
/// warning instead of blocking forever.
pub fn acquire_operation_lock() -> Result<OperationLock> {
    let lock = OperationLock::acquire()?;
    check_for_halted_operation()?;
    Ok(lock)
}

fn check_for_halted_operation() -> Result<()> {
    let Some(continuation) = Continuation::load()? else {
        return Ok(());
    };

    let repo_root = find_git_root()?;
    let git_dir = repo_root.join(".git");
    let rebase_active = git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists();

    if !rebase_active {
        eprintln!(
            "Cleaning up stale {} continuation (the rebase was aborted outside stackit)",
            continuation.kind
        );
        if !continuation.completed.is_empty() {
            eprintln!(
                "  Note: {} branch(es) were already processed. Run 'stackit doctor' to verify consistency.",
                continuation.completed.len()
            );
        }
        Continuation::clear()?;
        return Ok(());
    }

    let mut msg = format!("A {} is already in progress.\n", continuation.kind);
    if let Some(current) = &continuation.current_branch {
        msg.push_str(&format!("  Halted on: {}\n", current));
    }
    if !continuation.queue.is_empty() {
        msg.push_str(&format!("  Remaining: {} branch(es)\n", continuation.queue.len()));
    }
    msg.push_str("\nResolve conflicts and run 'stackit continue', or 'stackit abort' to roll back.");
    bail!("{}", msg);
}
