//! GitHub implementation over the `gh` CLI.
//!
//! Token discovery prefers `GITHUB_TOKEN`; without it, `gh`'s own stored
//! auth is used (`gh auth token` must succeed). Queries ask for JSON and
//! parse it, so output format changes in `gh` prose don't break us.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::errors::StackError;

use super::types::{PrState, RemotePr};
use super::Forge;

pub struct GitHubForge;

impl GitHubForge {
    pub fn new() -> Self {
        Self
    }

    /// The auth token, preferring the environment over `gh`'s keyring.
    fn token() -> Option<String> {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                return Some(token);
            }
        }
        let output = std::process::Command::new("gh").args(["auth", "token"]).output().ok()?;
        if output.status.success() {
            let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !token.is_empty() {
                return Some(token);
            }
        }
        None
    }

    fn command(args: &[&str]) -> Command {
        let mut cmd = Command::new("gh");
        cmd.args(args);
        if let Some(token) = Self::token() {
            cmd.env("GH_TOKEN", token);
        }
        cmd
    }
}

impl Default for GitHubForge {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct GhPr {
    number: u64,
    state: String,
    #[serde(rename = "baseRefName")]
    base_ref_name: String,
    url: String,
}

fn parse_state(raw: &str) -> Result<PrState> {
    match raw {
        "OPEN" => Ok(PrState::Open),
        "MERGED" => Ok(PrState::Merged),
        "CLOSED" => Ok(PrState::Closed),
        other => Err(StackError::PrHostError(format!("unknown PR state '{}'", other)).into()),
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn host_name(&self) -> &'static str {
        "github"
    }

    fn check_auth(&self) -> Result<()> {
        if Self::token().is_some() {
            return Ok(());
        }
        Err(StackError::PrHostError(
            "not authenticated: set GITHUB_TOKEN or run 'gh auth login'".to_string(),
        )
        .into())
    }

    async fn pr_for_branch(&self, branch: &str) -> Result<Option<RemotePr>> {
        let output = Self::command(&[
            "pr",
            "list",
            "--head",
            branch,
            "--state",
            "all",
            "--limit",
            "1",
            "--json",
            "number,state,baseRefName,url",
        ])
        .output()
        .await
        .context("Failed to run gh pr list")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(StackError::PrHostError(format!("gh pr list failed for '{}': {}", branch, stderr)).into());
        }

        let prs: Vec<GhPr> =
            serde_json::from_slice(&output.stdout).context("Unexpected JSON from gh pr list")?;
        let Some(pr) = prs.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(RemotePr {
            number: pr.number,
            state: parse_state(&pr.state)?,
            base: pr.base_ref_name,
            url: pr.url,
        }))
    }
}
