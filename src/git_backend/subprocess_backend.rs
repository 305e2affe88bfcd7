//! git CLI implementation of `GitBackend`.
//!
//! Works on any ref format, including reftable. Each operation spawns a git
//! subprocess; errors carry the command, its stderr and the exit code.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::StackError;

use super::{ExpectedRef, GitBackend, Oid, RefFormat};

pub struct SubprocessBackend {
    git_dir: PathBuf,
    workdir: PathBuf,
    ref_format: RefFormat,
}

impl SubprocessBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(path)
            .output()
            .context("Failed to find git directory")?;
        if !output.status.success() {
            return Err(StackError::NotInRepo.into());
        }
        let git_dir_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let git_dir = if Path::new(&git_dir_str).is_absolute() {
            PathBuf::from(git_dir_str)
        } else {
            path.join(git_dir_str)
        };

        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path)
            .output()
            .context("Failed to find working directory")?;
        if !output.status.success() {
            return Err(StackError::NotInRepo.into());
        }
        let workdir = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());

        let ref_format = super::detect_ref_format(path)?;

        Ok(Self {
            git_dir,
            workdir,
            ref_format,
        })
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .context(format!("Failed to run git {}", args.join(" ")))
    }

    fn run_checked(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(StackError::from_git_output(&args.join(" "), &output).into());
        }
        Ok(())
    }

    fn run_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(StackError::from_git_output(&args.join(" "), &output).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl GitBackend for SubprocessBackend {
    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn ref_format(&self) -> RefFormat {
        self.ref_format
    }

    fn current_branch(&self) -> Result<String> {
        let output = self.run(&["symbolic-ref", "--short", "HEAD"])?;
        if !output.status.success() {
            return Err(StackError::NotOnBranch.into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn create_branch_at(&self, name: &str, at_ref: &str) -> Result<()> {
        self.run_checked(&["branch", name, at_ref])
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", name);
        let output = self.run(&["show-ref", "--verify", "--quiet", &refname])?;
        Ok(output.status.success())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.run_checked(&["checkout", name])
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let output = self.run_stdout(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(output
            .lines()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.run_checked(&["branch", "-D", name])
    }

    fn rename_branch(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.run_checked(&["branch", "-m", old_name, new_name])
    }

    fn stage_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])
    }

    fn stage_tracked(&self) -> Result<()> {
        self.run_checked(&["add", "-u"])
    }

    fn commit(&self, message: Option<&str>, amend: bool, reset_author: bool) -> Result<()> {
        let mut args = vec!["commit"];
        if amend {
            args.push("--amend");
            if reset_author {
                args.push("--reset-author");
            }
        }
        match message {
            Some(msg) => {
                args.push("-m");
                args.push(msg);
            }
            None => args.push("--no-edit"),
        }
        self.run_checked(&args)
    }

    fn update_reference(&self, name: &str, target: &Oid, expected: &ExpectedRef, _log_msg: &str) -> Result<()> {
        match expected {
            ExpectedRef::Any => self.run_checked(&["update-ref", name, target.as_str()]),
            ExpectedRef::Current(current) => {
                self.run_checked(&["update-ref", name, target.as_str(), current.as_str()])
            }
        }
    }

    fn delete_reference(&self, name: &str) -> Result<()> {
        let output = self.run(&["update-ref", "-d", name])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Deleting an absent ref is fine
            if !stderr.contains("unable to resolve") && !stderr.contains("not exist") {
                return Err(StackError::from_git_output("update-ref -d", &output).into());
            }
        }
        Ok(())
    }

    fn find_reference(&self, name: &str) -> Result<Option<Oid>> {
        let output = self.run(&["show-ref", "--verify", "--hash", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            return Ok(None);
        }
        Ok(Some(Oid::from_str_unchecked(&sha)))
    }

    fn list_references(&self, pattern: &str) -> Result<Vec<(String, Oid)>> {
        // for-each-ref takes a prefix, not a glob
        let prefix = pattern.trim_end_matches('*');
        let output = self.run_stdout(&["for-each-ref", "--format=%(refname) %(objectname)", prefix])?;
        let mut refs = Vec::new();
        for line in output.lines() {
            if let Some((name, oid)) = line.split_once(' ') {
                refs.push((name.to_string(), Oid::from_str_unchecked(oid)));
            }
        }
        Ok(refs)
    }

    fn create_blob(&self, content: &[u8]) -> Result<Oid> {
        use std::io::Write;
        use std::process::Stdio;

        let mut child = Command::new("git")
            .args(["hash-object", "-w", "--stdin"])
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn git hash-object")?;

        child
            .stdin
            .as_mut()
            .context("Failed to open stdin for git hash-object")?
            .write_all(content)?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(StackError::from_git_output("hash-object", &output).into());
        }
        Ok(Oid::from_str_unchecked(&String::from_utf8_lossy(&output.stdout)))
    }

    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>> {
        let output = self.run(&["cat-file", "blob", oid.as_str()])?;
        if !output.status.success() {
            return Err(StackError::from_git_output("cat-file", &output).into());
        }
        Ok(output.stdout)
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let output = self.run_stdout(&["status", "--porcelain"])?;
        Ok(!output.is_empty())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let output = self.run(&["diff", "--cached", "--quiet"])?;
        Ok(!output.status.success())
    }

    fn has_staged_or_modified_changes(&self) -> Result<bool> {
        let output = self.run_stdout(&["status", "--porcelain"])?;
        // Skip untracked entries ("?? path")
        Ok(output.lines().any(|line| !line.starts_with("??")))
    }

    fn resolve(&self, reference: &str) -> Result<Oid> {
        let spec = format!("{}^{{commit}}", reference);
        let sha = self.run_stdout(&["rev-parse", "--verify", &spec])?;
        Ok(Oid::from_str_unchecked(&sha))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Oid> {
        let sha = self.run_stdout(&["merge-base", a, b])?;
        Ok(Oid::from_str_unchecked(&sha))
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let output = self.run(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        Ok(output.status.success())
    }

    fn commit_subject(&self, reference: &str) -> Result<String> {
        self.run_stdout(&["log", "-1", "--pretty=format:%s", reference])
    }
}
