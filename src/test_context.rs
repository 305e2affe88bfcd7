//! Thread-local test repository context.
//!
//! Tests run in parallel, so `std::env::set_current_dir()` is off the
//! table. Instead each test sets a thread-local repository path via
//! `TestRepoContext`; `GitGateway::new()`, `MetadataStore::new()` and
//! `find_git_root()` resolve through it in test builds.
//!
//! ```ignore
//! let dir = tempdir()?;
//! let _repo = init_test_repo(dir.path())?;
//! let _ctx = TestRepoContext::new(dir.path());
//! let gateway = GitGateway::new()?; // operates on dir, not the cwd
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

#[cfg(test)]
use anyhow::Result;

thread_local! {
    static TEST_REPO_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

/// RAII guard setting the thread-local repository path; cleared on drop,
/// including on panic. `!Send` so it cannot leak across threads.
pub struct TestRepoContext {
    _phantom: PhantomData<*const ()>,
}

impl TestRepoContext {
    pub fn new(path: &Path) -> Self {
        TEST_REPO_PATH.with(|p| *p.borrow_mut() = Some(path.to_path_buf()));
        Self { _phantom: PhantomData }
    }
}

impl Drop for TestRepoContext {
    fn drop(&mut self) {
        TEST_REPO_PATH.with(|p| *p.borrow_mut() = None);
    }
}

pub(crate) fn test_repo_path() -> Option<PathBuf> {
    TEST_REPO_PATH.with(|p| p.borrow().clone())
}

/// Initialize a throwaway repository with an initial commit on `main` and
/// the `.git/stackit/` directory in place.
#[cfg(test)]
pub fn init_test_repo(path: &Path) -> Result<git2::Repository> {
    use std::fs;

    let repo = git2::Repository::init(path)?;

    let mut config = repo.config()?;
    config.set_str("user.name", "Test User")?;
    config.set_str("user.email", "test@example.com")?;
    drop(config);

    let sig = git2::Signature::now("Test User", "test@example.com")?;
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])?;
    drop(tree);

    // Some environments still default to "master"
    {
        let mut branch = repo
            .find_branch("master", git2::BranchType::Local)
            .or_else(|_| repo.find_branch("main", git2::BranchType::Local))?;
        if branch.name()?.unwrap_or("") == "master" {
            branch.rename("main", false)?;
        }
    }

    fs::create_dir_all(path.join(".git").join("stackit"))?;
    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_context_sets_and_clears_path() {
        let dir = tempdir().unwrap();
        assert!(test_repo_path().is_none());
        {
            let _ctx = TestRepoContext::new(dir.path());
            assert_eq!(test_repo_path(), Some(dir.path().to_path_buf()));
        }
        assert!(test_repo_path().is_none());
    }

    #[test]
    fn test_context_clears_on_panic() {
        let dir = tempdir().unwrap();
        let result = std::panic::catch_unwind(|| {
            let _ctx = TestRepoContext::new(dir.path());
            panic!("intentional");
        });
        assert!(result.is_err());
        assert!(test_repo_path().is_none());
    }
}
