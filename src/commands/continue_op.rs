//! Resume a halted sequence from its continuation record.

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::meta::MetadataStore;
use crate::state::Continuation;
use crate::ui;

use super::restack;

pub fn run() -> Result<()> {
    let gateway = GitGateway::new()?;

    let Some(mut continuation) = Continuation::load()? else {
        anyhow::bail!("No operation in progress. Nothing to continue.");
    };

    // Finish the conflicted rebase first
    if gateway.rebase_in_progress()? {
        ui::step(&format!(
            "Continuing {} on {}...",
            continuation.kind,
            continuation.current_branch.as_deref().unwrap_or("?")
        ));
        if gateway.rebase_continue()?.has_conflicts() {
            ui::warning("Conflicts remain. Resolve them, stage the files, and run 'stackit continue' again.");
            return Ok(());
        }
    }

    // The halted branch is now done
    if let Some(branch) = continuation.current_branch.take() {
        if !continuation.completed.contains(&branch) {
            continuation.completed.push(branch);
        }
        continuation.save()?;
    }

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    restack::run_sequence(&gateway, &store, &config, continuation)
}
