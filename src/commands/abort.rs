//! Abort a halted sequence: discard git's mid-operation state, restore the
//! pre-operation snapshot, clear the continuation. Idempotent.

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::meta::MetadataStore;
use crate::snapshots::SnapshotStore;
use crate::state::Continuation;
use crate::ui;

pub fn run() -> Result<()> {
    let gateway = GitGateway::new()?;

    if gateway.rebase_in_progress()? {
        gateway.rebase_abort()?;
        ui::step("Aborted in-progress rebase");
    }
    if gateway.merge_in_progress()? {
        gateway.merge_abort()?;
        ui::step("Aborted in-progress merge");
    }

    let Some(continuation) = Continuation::load()? else {
        ui::success("Nothing to abort");
        return Ok(());
    };

    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let snapshots = SnapshotStore::open(config.undo.depth)?;

    match snapshots.get(&continuation.snapshot_id) {
        Ok(snapshot) => {
            snapshots.restore(&gateway, &store, &snapshot)?;
            ui::step(&format!("Restored pre-{} state", continuation.kind));
        }
        Err(e) => {
            ui::warning(&format!(
                "Could not restore snapshot '{}': {}. Refs are left as they are.",
                continuation.snapshot_id, e
            ));
        }
    }

    Continuation::clear()?;

    if gateway.branch_exists(&continuation.original_branch)? {
        gateway.checkout_branch(&continuation.original_branch)?;
    }

    ui::success_bold(&format!("{} aborted", continuation.kind));
    Ok(())
}
