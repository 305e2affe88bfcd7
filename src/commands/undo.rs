//! Restore a snapshot.

use anyhow::Result;
use chrono::Local;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::meta::MetadataStore;
use crate::snapshots::SnapshotStore;
use crate::state::acquire_operation_lock;
use crate::ui;

pub fn run(snapshot_id: Option<String>, list: bool, yes: bool) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let snapshots = SnapshotStore::open(config.undo.depth)?;

    if list {
        let all = snapshots.list()?;
        if all.is_empty() {
            ui::success("No snapshots recorded yet");
            return Ok(());
        }
        for snapshot in all {
            let when = snapshot.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
            println!(
                "{}  {}  {} ({} branches)",
                snapshot.id,
                when,
                snapshot.argv.join(" "),
                snapshot.tips.len()
            );
        }
        return Ok(());
    }

    let _lock = acquire_operation_lock()?;
    gateway.ensure_no_operation_in_progress()?;

    let snapshot = match snapshot_id {
        Some(id) => snapshots.get(&id)?,
        None => snapshots
            .latest()?
            .ok_or_else(|| anyhow::anyhow!("No snapshots to undo"))?,
    };

    let when = snapshot.timestamp.with_timezone(&Local).format("%H:%M:%S");
    ui::step(&format!(
        "Restoring state from before '{}' ({}, {} branches)",
        snapshot.argv.join(" "),
        when,
        snapshot.tips.len()
    ));
    if !ui::confirm("Restore this snapshot?", yes)? {
        anyhow::bail!("Aborted.");
    }

    snapshots.restore(&gateway, &store, &snapshot)?;
    ui::success_bold("Restored");
    Ok(())
}
