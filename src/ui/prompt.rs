//! Interactive prompts.
//!
//! Every prompt fails fast when the session is non-interactive
//! (`STACKIT_NON_INTERACTIVE` / `STACKIT_TEST_NO_INTERACTIVE`, or no TTY),
//! so scripted callers get an actionable error instead of a hang.

use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect};
use std::io::IsTerminal;

use crate::context::non_interactive;

fn require_interactive(what: &str) -> Result<()> {
    if non_interactive() {
        bail!(
            "{} requires a prompt, but prompts are disabled. Pass --force/--yes or unset STACKIT_NON_INTERACTIVE.",
            what
        );
    }
    if !std::io::stdin().is_terminal() {
        bail!("{} requires an interactive terminal. Pass --force/--yes instead.", what);
    }
    Ok(())
}

/// Yes/no confirmation; `assume_yes` bypasses the prompt.
pub fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    require_interactive("Confirmation")?;
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact()?)
}

/// Ask for a branch name, pre-sanitized through the config rules.
pub fn input_branch_name(prompt: &str) -> Result<String> {
    require_interactive("Branch naming")?;
    let raw: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?;
    let name = crate::config::sanitize_ref_name(&raw);
    if name.is_empty() {
        bail!("Branch name is empty after sanitization");
    }
    Ok(name)
}

/// Multi-select over display items; returns the chosen indices.
pub fn select_indices(prompt: &str, items: &[String]) -> Result<Vec<usize>> {
    require_interactive("Selection")?;
    Ok(MultiSelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(items)
        .interact()?)
}
