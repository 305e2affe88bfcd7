//! Shell completion generation.

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells::Shell};

pub fn run(shell: Shell) -> Result<()> {
    let mut cmd = crate::Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
