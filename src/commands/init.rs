//! Designate trunk(s) and create the local config.

use anyhow::Result;

use crate::config::{Config, LocalConfig};
use crate::git_gateway::GitGateway;
use crate::ui;

pub fn run(trunk: Option<String>, reset: bool) -> Result<()> {
    let gateway = GitGateway::new()?;

    let mut local = if reset {
        LocalConfig::default()
    } else {
        Config::load_local()?
    };

    if !local.trunks.is_empty() && !reset {
        ui::success(&format!(
            "Already initialized (trunk: {}). Use 'stackit trunk --add' to add trunks.",
            local.trunks[0]
        ));
        return Ok(());
    }

    let trunk = match trunk {
        Some(name) => {
            if !gateway.branch_exists(&name)? {
                anyhow::bail!("Branch '{}' does not exist", name);
            }
            name
        }
        None => detect_trunk(&gateway)?,
    };

    local.trunks = vec![trunk.clone()];
    Config::save_local(&local)?;

    ui::success_bold(&format!("Initialized with trunk {}", ui::branch_name(&trunk)));
    ui::step("Create your first stacked branch with 'stackit create -m \"...\"'");
    Ok(())
}

/// Prefer main, then master, then the current branch.
fn detect_trunk(gateway: &GitGateway) -> Result<String> {
    for candidate in ["main", "master"] {
        if gateway.branch_exists(candidate)? {
            return Ok(candidate.to_string());
        }
    }
    gateway
        .current_branch()
        .map_err(|_| anyhow::anyhow!("Could not detect a trunk branch; pass one with 'stackit init --trunk <name>'"))
}
