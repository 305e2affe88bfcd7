use clap::{Parser, Subcommand};

mod commands;
mod config;
mod context;
mod errors;
mod forge;
mod git_backend;
mod git_gateway;
mod graph;
mod logging;
mod meta;
mod snapshots;
mod state;
#[cfg(test)]
mod test_context;
pub mod ui;
mod validation;

#[derive(Parser)]
#[command(
    name = "stackit",
    about = "Stacked pull-request workflow for git",
    long_about = None,
    version,
    disable_help_subcommand = true,
    help_template = "\
{about}

{usage-heading} {usage}

Get Started:
  init        Designate trunk(s) and create config
  create      Start a new child branch of the current branch
  log         Show the branch tree

Core Workflow:
  modify      Amend (default) or add a commit; restack descendants
  absorb      Distribute staged hunks into earlier stack commits
  sync        Reconcile with the PR host and restack

Manage Stack:
  restack     Rebase branches onto their parents' tips
  squash      Combine all commits on the current branch
  fold        Merge the current branch into its parent
  split       Decompose a branch (by commit / hunk / file)
  rename      Rename the current branch
  delete      Delete branch(es), adopting children upward

Navigate:
  up, down    Move along the stack
  top, bottom Jump to the ends of the stack
  parent      Print the parent branch
  children    Print the child branches

Recovery:
  status      Show the current branch and any halted operation
  continue    Resume a halted sequence
  abort       Cancel a halted sequence and roll back
  undo        Restore a snapshot
  doctor      Audit (and optionally repair) the graph

Setup:
  track       Adopt an existing branch into the graph
  untrack     Release a branch from the graph
  trunk       Show or extend the trunk set
  info        Show branch details
  completion  Generate shell completions

Options:
  -v, --verbose   Show git commands being executed
      --dry-run   Preview without executing
  -h, --help      Print help
  -V, --version   Print version

Run 'stackit <command> --help' for details on a command.
"
)]
pub struct Cli {
    /// Show git commands being executed
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Preview destructive operations without executing them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Designate trunk(s); create config
    Init {
        /// Trunk branch name (defaults to main/master when present)
        #[arg(long)]
        trunk: Option<String>,
        /// Discard existing stackit config and reinitialize
        #[arg(long)]
        reset: bool,
    },

    /// Start a new child of the current branch; commit if staged
    #[command(after_help = "\
Examples:
  create feature             Create a branch named 'feature'
  create -m \"Add login\"      Name derived from the pattern and message
  create -am \"Fix bug\"       Stage everything and commit")]
    Create {
        /// Branch name (derived from -m via the naming pattern if omitted)
        name: Option<String>,
        /// Commit message
        #[arg(short = 'm', long)]
        message: Option<String>,
        /// Stage all changes first
        #[arg(short = 'a', long)]
        all: bool,
        /// Stage tracked-file updates only (git add -u)
        #[arg(short = 'u', long)]
        update: bool,
        /// Stage interactively (git add -p)
        #[arg(short = 'p', long)]
        patch: bool,
        /// Insert between the current branch and its child
        #[arg(long)]
        insert: bool,
        /// Scope tag for the new branch (e.g. a ticket id; "none" breaks inheritance)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Amend (default) or add a new commit; auto-restack descendants
    Modify {
        /// Stage all changes first
        #[arg(short = 'a', long)]
        all: bool,
        /// Stage tracked-file updates only
        #[arg(short = 'u', long)]
        update: bool,
        /// Stage interactively
        #[arg(short = 'p', long)]
        patch: bool,
        /// Commit message
        #[arg(short = 'm', long)]
        message: Option<String>,
        /// Create a new commit instead of amending
        #[arg(short = 'c', long)]
        commit: bool,
        /// Skip the automatic restack of descendants
        #[arg(short = 'n', long = "no-restack")]
        no_restack: bool,
        /// Stamp the current user as author while amending
        #[arg(long)]
        reset_author: bool,
        /// Open an interactive rebase over the branch's commits
        #[arg(short = 'i', long)]
        interactive_rebase: bool,
    },

    /// Combine all commits on the current branch
    Squash {
        /// Message for the squashed commit (default: first commit's subject)
        #[arg(short = 'm', long)]
        message: Option<String>,
        /// Skip the automatic restack of descendants
        #[arg(short = 'n', long = "no-restack")]
        no_restack: bool,
    },

    /// Merge the current branch into its parent; delete the absorbed branch
    Fold {
        /// Fold the parent into the current branch instead
        #[arg(long)]
        keep: bool,
    },

    /// Rename the current branch; children follow automatically
    Rename {
        /// New name
        name: Option<String>,
        /// Keep PR info despite the host still naming the old branch
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Delete branch(es); children adopt the deleted branch's parent
    Delete {
        /// Branch to delete (default: current)
        name: Option<String>,
        /// Also delete all descendants
        #[arg(long, conflicts_with = "downstack")]
        upstack: bool,
        /// Also delete all ancestors up to trunk
        #[arg(long, conflicts_with = "upstack")]
        downstack: bool,
        /// Skip the unmerged-branches confirmation
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Decompose the current branch into a chain
    #[command(after_help = "\
Examples:
  split --by-commit           Pick branch points over the commit list
  split --by-file api,config  Extract paths into a new parent branch
  split --by-hunk             Re-stage interactively (needs a TTY)")]
    Split {
        /// One branch per selected branch point in the commit history
        #[arg(short = 'c', long = "by-commit", conflicts_with_all = ["by_file", "by_hunk"])]
        by_commit: bool,
        /// Interactive hunk selection loop
        #[arg(short = 'H', long = "by-hunk", conflicts_with_all = ["by_commit", "by_file"])]
        by_hunk: bool,
        /// Extract matching paths into a new parent branch
        #[arg(short = 'f', long = "by-file", num_args = 1.., conflicts_with_all = ["by_commit", "by_hunk"])]
        by_file: Option<Vec<String>>,
    },

    /// Distribute staged hunks into the stack commits they belong to
    /// (the global --dry-run prints the assignment without rewriting)
    Absorb {
        /// Stage all changes first
        #[arg(short = 'a', long)]
        all: bool,
        /// Stage interactively first
        #[arg(short = 'p', long)]
        patch: bool,
        /// Skip confirmation prompts
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Rebase the current branch (and descendants) onto parents' tips
    Restack {
        /// Branch to start from (default: current)
        #[arg(short = 'b', long)]
        branch: Option<String>,
        /// Only this branch, no descendants
        #[arg(long)]
        only: bool,
        /// The branch and all descendants (the default)
        #[arg(long)]
        upstack: bool,
        /// Ancestors down to trunk, then the branch
        #[arg(long)]
        downstack: bool,
    },

    /// Show the current branch and any halted operation
    Status,

    /// Resume a halted restack/sync/absorb sequence
    #[command(name = "continue")]
    Continue,

    /// Cancel a halted sequence and restore the pre-operation snapshot
    Abort,

    /// Reconcile the local graph with the PR host
    Sync {
        /// Delete merged/closed branches without prompting
        #[arg(short = 'f', long)]
        force: bool,
        /// Skip the restack phase
        #[arg(long)]
        no_restack: bool,
    },

    /// Show the branch tree
    Log {
        /// Only the current stack
        #[arg(long)]
        stack: bool,
        /// Limit tree depth
        #[arg(long, value_name = "N")]
        steps: Option<usize>,
        /// Print trunk last
        #[arg(short = 'r', long)]
        reverse: bool,
    },

    /// Move toward the leaves
    Up {
        /// Number of steps
        #[arg(default_value = "1")]
        steps: usize,
        /// Jump directly to an upstack branch
        #[arg(long, value_name = "BRANCH")]
        to: Option<String>,
    },

    /// Move toward trunk
    Down {
        /// Number of steps
        #[arg(default_value = "1")]
        steps: usize,
    },

    /// Jump to the top of the stack
    Top,

    /// Jump to the bottom of the stack
    Bottom,

    /// Print the parent branch
    Parent,

    /// Print the child branches
    Children,

    /// Show or extend the trunk set
    Trunk {
        /// Add another trunk
        #[arg(long, value_name = "BRANCH")]
        add: Option<String>,
        /// List all trunks
        #[arg(long)]
        all: bool,
    },

    /// Restore a snapshot taken before a previous command
    Undo {
        /// Snapshot id (default: most recent)
        #[arg(long, value_name = "ID")]
        snapshot: Option<String>,
        /// List snapshots instead of restoring
        #[arg(long)]
        list: bool,
        /// Skip the confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Audit the graph, metadata and environment
    Doctor {
        /// Apply prune-safe repairs
        #[arg(long)]
        fix: bool,
    },

    /// Show branch details
    Info {
        /// Branch (default: current)
        branch: Option<String>,
        /// Print only the tip commit id
        #[arg(short = 'b')]
        tip: bool,
        /// Print only the tip commit subject
        #[arg(short = 'd')]
        description: bool,
        /// Print only the parent
        #[arg(short = 'p')]
        parent: bool,
        /// Print only the effective scope
        #[arg(short = 's')]
        scope: bool,
    },

    /// Adopt an existing branch into the graph
    Track {
        /// Branch to track (default: current)
        branch: Option<String>,
        /// Parent branch (default: primary trunk)
        #[arg(short = 'p', long)]
        parent: Option<String>,
    },

    /// Release a branch from the graph
    Untrack {
        /// Branch to untrack (default: current)
        branch: Option<String>,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::shells::Shell,
    },
}

fn install_signal_handler() {
    ctrlc::set_handler(|| {
        // Sequences persist their continuation at each checkpoint, so an
        // interrupt only needs to say how to pick things up.
        eprintln!("\n\nInterrupted. Run:");
        eprintln!("  stackit continue   to resume");
        eprintln!("  stackit abort      to roll back");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");
}

#[tokio::main]
async fn main() {
    install_signal_handler();

    let cli = Cli::parse();

    context::ExecutionContext::init(cli.verbose, cli.dry_run);
    let ctx = context::ExecutionContext::new(cli.verbose, cli.dry_run);

    let command = match &cli.command {
        Some(cmd) => cmd,
        None => {
            eprintln!("No command provided. Run 'stackit --help' for usage.");
            std::process::exit(1);
        }
    };

    let result = context::with_context(ctx, async {
        match command {
            Commands::Init { trunk, reset } => commands::init::run(trunk.clone(), *reset),
            Commands::Create {
                name,
                message,
                all,
                update,
                patch,
                insert,
                scope,
            } => commands::create::run(
                name.clone(),
                message.clone(),
                *all,
                *update,
                *patch,
                *insert,
                scope.clone(),
            ),
            Commands::Modify {
                all,
                update,
                patch,
                message,
                commit,
                no_restack,
                reset_author,
                interactive_rebase,
            } => commands::modify::run(
                *all,
                *update,
                *patch,
                message.clone(),
                *commit,
                *no_restack,
                *reset_author,
                *interactive_rebase,
            ),
            Commands::Squash { message, no_restack } => commands::squash::run(message.clone(), *no_restack),
            Commands::Fold { keep } => commands::fold::run(*keep),
            Commands::Rename { name, force } => commands::rename::run(name.clone(), *force),
            Commands::Delete {
                name,
                upstack,
                downstack,
                force,
            } => commands::delete::run(name.clone(), *upstack, *downstack, *force),
            Commands::Split {
                by_commit,
                by_hunk,
                by_file,
            } => commands::split::run(*by_commit, *by_hunk, by_file.clone()),
            Commands::Absorb { all, patch, force } => {
                commands::absorb::run(*all, *patch, context::ExecutionContext::is_dry_run(), *force)
            }
            Commands::Restack {
                branch,
                only,
                upstack,
                downstack,
            } => commands::restack::run(branch.clone(), *only, *upstack, *downstack),
            Commands::Status => commands::status::run(),
            Commands::Continue => commands::continue_op::run(),
            Commands::Abort => commands::abort::run(),
            Commands::Sync { force, no_restack } => commands::sync::run(*force, *no_restack).await,
            Commands::Log { stack, steps, reverse } => commands::log::run(*stack, *steps, *reverse),
            Commands::Up { steps, to } => commands::up_down::run_up(*steps, to.clone()),
            Commands::Down { steps } => commands::up_down::run_down(*steps),
            Commands::Top => commands::top::run(),
            Commands::Bottom => commands::bottom::run(),
            Commands::Parent => commands::info::run_parent(),
            Commands::Children => commands::info::run_children(),
            Commands::Trunk { add, all } => commands::info::run_trunk(add.clone(), *all),
            Commands::Undo { snapshot, list, yes } => commands::undo::run(snapshot.clone(), *list, *yes),
            Commands::Doctor { fix } => commands::doctor::run(*fix),
            Commands::Info {
                branch,
                tip,
                description,
                parent,
                scope,
            } => commands::info::run(
                branch.clone(),
                commands::info::InfoFields {
                    tip: *tip,
                    description: *description,
                    parent: *parent,
                    scope: *scope,
                },
            ),
            Commands::Track { branch, parent } => commands::track::run_track(branch.clone(), parent.clone()),
            Commands::Untrack { branch } => commands::track::run_untrack(branch.clone()),
            Commands::Completion { shell } => commands::completion::run(*shell),
        }
    })
    .await;

    if let Err(e) = result {
        eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
