//! Render the branch graph as a text tree.

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::git_gateway::GitGateway;
use crate::graph::BranchGraph;
use crate::meta::MetadataStore;

pub fn run(stack_only: bool, steps: Option<usize>, reverse: bool) -> Result<()> {
    let gateway = GitGateway::new()?;
    let store = MetadataStore::new()?;
    let config = Config::load()?;
    let graph = BranchGraph::load(&gateway, &store, &config)?;
    let trunk = graph.trunk()?;

    for warning in &graph.warnings {
        crate::ui::warning(warning);
    }

    let current = gateway.current_branch().unwrap_or_default();

    let mut lines: Vec<String> = Vec::new();
    if stack_only && !graph.is_trunk(&current) && graph.is_tracked(&current) {
        // Just the stack through the current branch
        let chain = graph.full_stack(&current)?;
        for (depth, name) in chain.iter().enumerate() {
            lines.push(render_line(&graph, &gateway, name, depth + 1, &current)?);
        }
        lines.insert(0, render_line(&graph, &gateway, &trunk, 0, &current)?);
    } else {
        let mut visited = std::collections::HashSet::new();
        render_subtree(&graph, &gateway, &trunk, 0, &current, steps, &mut visited, &mut lines)?;
    }

    if reverse {
        lines.reverse();
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn render_subtree(
    graph: &BranchGraph,
    gateway: &GitGateway,
    name: &str,
    depth: usize,
    current: &str,
    steps: Option<usize>,
    visited: &mut std::collections::HashSet<String>,
    lines: &mut Vec<String>,
) -> Result<()> {
    if let Some(limit) = steps {
        if depth > limit {
            return Ok(());
        }
    }
    // A cyclic graph is corrupt; don't loop while rendering it
    if !visited.insert(name.to_string()) {
        return Ok(());
    }
    lines.push(render_line(graph, gateway, name, depth, current)?);
    for child in graph.children_of(name) {
        render_subtree(graph, gateway, child, depth + 1, current, steps, visited, lines)?;
    }
    Ok(())
}

fn render_line(
    graph: &BranchGraph,
    gateway: &GitGateway,
    name: &str,
    depth: usize,
    current: &str,
) -> Result<String> {
    let marker = if name == current { "◉".green().to_string() } else { "◯".to_string() };
    let indent = "  ".repeat(depth);

    let mut decorations: Vec<String> = Vec::new();
    if graph.is_trunk(name) {
        decorations.push("trunk".blue().to_string());
    }
    if let Some(branch) = graph.get(name) {
        if let Some(pr) = &branch.pr_info {
            decorations.push(format!("#{} {}", pr.number, pr.state).cyan().to_string());
        }
        if let Some(scope) = graph.effective_scope(name) {
            decorations.push(format!("[{}]", scope).magenta().to_string());
        }
    }
    if graph.needs_restack(name).unwrap_or(false) {
        decorations.push("needs restack".yellow().to_string());
    }

    let subject = gateway.commit_subject(name).unwrap_or_default();
    let styled = if name == current {
        name.green().bold().to_string()
    } else {
        name.to_string()
    };

    let suffix = if decorations.is_empty() {
        String::new()
    } else {
        format!(" ({})", decorations.join(", "))
    };
    Ok(format!("{}{} {}{} {}", indent, marker, styled, suffix, subject.dimmed()))
}
