//! libgit2 implementation of `GitBackend` for files-format repositories.

use anyhow::{Context, Result};
use git2::{BranchType, IndexAddOption, Repository, Signature};
use std::path::{Path, PathBuf};

use super::{ExpectedRef, GitBackend, Oid, RefFormat};

pub struct Git2Backend {
    repo: Repository,
    git_dir: PathBuf,
    workdir: PathBuf,
}

impl Git2Backend {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).context("Failed to open git repository with git2")?;
        let git_dir = repo.path().to_path_buf();
        let workdir = repo.workdir().context("Not a work tree")?.to_path_buf();
        Ok(Self { repo, git_dir, workdir })
    }

    fn signature(&self) -> Result<Signature<'_>> {
        self.repo
            .signature()
            .or_else(|_| Signature::now("stackit", "stackit@local"))
            .context("Failed to create signature")
    }

    fn peel_commit(&self, reference: &str) -> Result<git2::Commit<'_>> {
        let obj = self
            .repo
            .revparse_single(reference)
            .context(format!("Failed to resolve '{}'", reference))?;
        obj.peel_to_commit()
            .context(format!("'{}' is not a commit", reference))
    }
}

impl GitBackend for Git2Backend {
    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn ref_format(&self) -> RefFormat {
        RefFormat::Files
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head().context("Failed to get HEAD")?;
        if !head.is_branch() {
            return Err(crate::errors::StackError::NotOnBranch.into());
        }
        head.shorthand()
            .map(|s| s.to_string())
            .context("Branch name is not valid UTF-8")
    }

    fn create_branch_at(&self, name: &str, at_ref: &str) -> Result<()> {
        let commit = self.peel_commit(at_ref)?;
        self.repo
            .branch(name, &commit, false)
            .context(format!("Failed to create branch '{}' at '{}'", name, at_ref))?;
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", name);
        let reference = self
            .repo
            .find_reference(&refname)
            .context(format!("Branch '{}' not found", name))?;
        let commit = reference.peel_to_commit()?;
        let tree = commit.tree()?;

        // Safe checkout: never clobber uncommitted or untracked files
        let mut builder = git2::build::CheckoutBuilder::new();
        builder.safe().recreate_missing(true);
        self.repo
            .checkout_tree(tree.as_object(), Some(&mut builder))
            .context(format!("Failed to checkout '{}'", name))?;
        self.repo
            .set_head(&refname)
            .context(format!("Failed to set HEAD to '{}'", name))?;
        Ok(())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut branches = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                branches.push(name.to_string());
            }
        }
        Ok(branches)
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .context(format!("Branch '{}' not found", name))?;
        branch.delete().context(format!("Failed to delete branch '{}'", name))?;
        Ok(())
    }

    fn rename_branch(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut branch = self
            .repo
            .find_branch(old_name, BranchType::Local)
            .context(format!("Branch '{}' not found", old_name))?;
        branch
            .rename(new_name, false)
            .context(format!("Failed to rename '{}' to '{}'", old_name, new_name))?;
        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        let mut index = self.repo.index().context("Failed to get index")?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .context("Failed to stage all files")?;
        index.write().context("Failed to write index")?;
        Ok(())
    }

    fn stage_tracked(&self) -> Result<()> {
        let mut index = self.repo.index().context("Failed to get index")?;
        index.update_all(["*"].iter(), None).context("Failed to stage updates")?;
        index.write().context("Failed to write index")?;
        Ok(())
    }

    fn commit(&self, message: Option<&str>, amend: bool, reset_author: bool) -> Result<()> {
        let sig = self.signature()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        if amend {
            let head = self.repo.head()?;
            let tip = head.peel_to_commit()?;
            let msg = message.unwrap_or_else(|| tip.message().unwrap_or(""));
            let author = if reset_author { Some(&sig) } else { None };
            tip.amend(Some("HEAD"), author, Some(&sig), None, Some(msg), Some(&tree))?;
        } else {
            let message = message.context("Commit message required")?;
            let head = self.repo.head()?;
            let parent = head.peel_to_commit()?;
            self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        }
        Ok(())
    }

    fn update_reference(&self, name: &str, target: &Oid, expected: &ExpectedRef, log_msg: &str) -> Result<()> {
        let oid = git2::Oid::from_str(target.as_str()).context("Invalid oid")?;
        match expected {
            ExpectedRef::Any => {
                self.repo
                    .reference(name, oid, true, log_msg)
                    .context(format!("Failed to update reference '{}'", name))?;
            }
            ExpectedRef::Current(current) => {
                let current = git2::Oid::from_str(current.as_str()).context("Invalid expected oid")?;
                self.repo
                    .reference_matching(name, oid, true, current, log_msg)
                    .context(format!("Reference '{}' changed concurrently", name))?;
            }
        }
        Ok(())
    }

    fn delete_reference(&self, name: &str) -> Result<()> {
        match self.repo.find_reference(name) {
            Ok(mut reference) => {
                reference
                    .delete()
                    .context(format!("Failed to delete reference '{}'", name))?;
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => {}
            Err(e) => return Err(e).context(format!("Failed to find reference '{}'", name)),
        }
        Ok(())
    }

    fn find_reference(&self, name: &str) -> Result<Option<Oid>> {
        match self.repo.find_reference(name) {
            Ok(reference) => {
                let oid = reference.target().context("Reference has no direct target")?;
                Ok(Some(Oid::from(oid)))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_references(&self, pattern: &str) -> Result<Vec<(String, Oid)>> {
        let mut refs = Vec::new();
        for reference in self.repo.references_glob(pattern)? {
            let reference = reference?;
            if let (Some(name), Some(oid)) = (reference.name(), reference.target()) {
                refs.push((name.to_string(), Oid::from(oid)));
            }
        }
        Ok(refs)
    }

    fn create_blob(&self, content: &[u8]) -> Result<Oid> {
        let oid = self.repo.blob(content).context("Failed to create blob")?;
        Ok(Oid::from(oid))
    }

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        let git_oid = git2::Oid::from_str(oid.as_str()).context("Invalid oid")?;
        let blob = self.repo.find_blob(git_oid).context("Failed to find blob")?;
        Ok(blob.content().to_vec())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_ignored(false).include_untracked(true);
        let statuses = self.repo.statuses(Some(&mut opts)).context("Failed to get status")?;
        Ok(!statuses.is_empty())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        for entry in statuses.iter() {
            if entry.status().intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE,
            ) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn has_staged_or_modified_changes(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        for entry in statuses.iter() {
            if entry.status().intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::WT_TYPECHANGE,
            ) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve(&self, reference: &str) -> Result<Oid> {
        let commit = self.peel_commit(reference)?;
        Ok(Oid::from(commit.id()))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Oid> {
        let oid_a = git2::Oid::from_str(self.resolve(a)?.as_str())?;
        let oid_b = git2::Oid::from_str(self.resolve(b)?.as_str())?;
        let base = self
            .repo
            .merge_base(oid_a, oid_b)
            .context(format!("No merge base between '{}' and '{}'", a, b))?;
        Ok(Oid::from(base))
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let anc = git2::Oid::from_str(self.resolve(ancestor)?.as_str())?;
        let desc = git2::Oid::from_str(self.resolve(descendant)?.as_str())?;
        match self.repo.merge_base(anc, desc) {
            Ok(base) => Ok(base == anc),
            Err(_) => Ok(false),
        }
    }

    fn commit_subject(&self, reference: &str) -> Result<String> {
        let commit = self.peel_commit(reference)?;
        let message = commit.message().unwrap_or("");
        Ok(message.lines().next().unwrap_or("").to_string())
    }
}
