//! One module per CLI command.

pub mod abort;
pub mod absorb;
pub mod bottom;
pub mod completion;
pub mod continue_op;
pub mod create;
pub mod delete;
pub mod doctor;
pub mod fold;
pub mod info;
pub mod init;
pub mod log;
pub mod modify;
pub mod rename;
pub mod restack;
pub mod split;
pub mod squash;
pub mod status;
pub mod sync;
pub mod top;
pub mod track;
pub mod undo;
pub mod up_down;

use anyhow::Result;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::meta::MetadataStore;
use crate::snapshots::{Snapshot, SnapshotStore};

/// The argv of the running command, recorded into snapshots and
/// continuations for `stackit status`-style messaging.
pub(crate) fn current_argv() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Take the pre-operation snapshot every destructive command starts with.
pub(crate) fn take_snapshot(
    gateway: &GitGateway,
    store: &MetadataStore,
    config: &Config,
    command: &str,
) -> Result<Snapshot> {
    let snapshots = SnapshotStore::open(config.undo.depth)?;
    snapshots.take(gateway, store, &config.trunks, command, &current_argv())
}
