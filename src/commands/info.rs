//! Branch details and the parent/children/trunk views.

use anyhow::Result;
use colored::Colorize;

use crate::config::{Config, LocalConfig};
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;
use crate::ui;

/// Field selectors: with none set, everything prints.
pub struct InfoFields {
    pub tip: bool,
    pub description: bool,
    pub parent: bool,
    pub scope: bool,
}

impl InfoFields {
    fn any(&self) -> bool {
        self.tip || self.description || self.parent || self.scope
    }
}

pub fn run(branch: Option<String>, fields: InfoFields) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let name = match branch {
        Some(b) => b,
        None => gateway.current_branch()?,
    };
    let Some(branch) = graph.get(&name) else {
        anyhow::bail!("Branch '{}' does not exist", name);
    };

    // Single-field selectors print bare values for scripting
    if fields.any() {
        if fields.tip {
            if let Some(tip) = &branch.tip {
                println!("{}", tip);
            }
        }
        if fields.description {
            println!("{}", gateway.commit_subject(&name).unwrap_or_default());
        }
        if fields.parent {
            if let Some(parent) = &branch.parent {
                println!("{}", parent);
            }
        }
        if fields.scope {
            if let Some(scope) = graph.effective_scope(&name) {
                println!("{}", scope);
            }
        }
        return Ok(());
    }

    println!("{}", name.green().bold());
    if let Some(tip) = &branch.tip {
        println!("  tip:      {} {}", tip.short(), gateway.commit_subject(&name).unwrap_or_default());
    }
    if branch.is_trunk {
        println!("  role:     trunk");
    }
    match &branch.parent {
        Some(parent) => {
            let commits = gateway.commit_count(parent, &name).unwrap_or(0);
            println!("  parent:   {}", parent);
            println!("  commits:  {} over {}", commits, parent);
        }
        None if !branch.is_trunk => println!("  parent:   (untracked)"),
        None => {}
    }
    let children = graph.children_of(&name);
    if !children.is_empty() {
        println!("  children: {}", children.join(", "));
    }
    match branch.scope_setting() {
        crate::meta::ScopeSetting::Explicit(s) => println!("  scope:    {}", s),
        crate::meta::ScopeSetting::Broken => println!("  scope:    (broken: descendants inherit nothing)"),
        crate::meta::ScopeSetting::Inherit => {
            if let Some(scope) = graph.effective_scope(&name) {
                println!("  scope:    {} (inherited)", scope);
            }
        }
    }
    if let Some(pr) = &branch.pr_info {
        println!("  pr:       #{} {} (base: {})", pr.number, pr.state, pr.base);
        println!("            {}", pr.url.dimmed());
    }
    if graph.needs_restack(&name)? {
        println!("  state:    {}", "needs restack".yellow());
    }
    Ok(())
}

pub fn run_parent() -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let current = gateway.current_branch()?;
    match graph.parent_of(&current) {
        Some(parent) => println!("{}", parent),
        None => ui::warning(&format!("'{}' has no parent", current)),
    }
    Ok(())
}

pub fn run_children() -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;

    let current = gateway.current_branch()?;
    for child in graph.children_of(&current) {
        println!("{}", child);
    }
    Ok(())
}

pub fn run_trunk(add: Option<String>, all: bool) -> Result<()> {
    let gateway = GitGateway::new()?;

    if let Some(name) = add {
        if !gateway.branch_exists(&name)? {
            anyhow::bail!("Branch '{}' does not exist", name);
        }
        let mut local: LocalConfig = Config::load_local()?;
        if local.trunks.iter().any(|t| t == &name) {
            ui::success(&format!("'{}' is already a trunk", name));
            return Ok(());
        }
        local.trunks.push(name.clone());
        Config::save_local(&local)?;
        ui::success_bold(&format!("Added trunk {}", ui::branch_name(&name)));
        return Ok(());
    }

    let config = Config::load()?;
    if all {
        for (i, trunk) in config.trunks.iter().enumerate() {
            if i == 0 {
                println!("{} (primary)", trunk);
            } else {
                println!("{}", trunk);
            }
        }
    } else {
        println!("{}", config.require_trunk()?);
    }
    Ok(())
}
