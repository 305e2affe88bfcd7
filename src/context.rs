//! Execution context for the CLI invocation.
//!
//! Carries the global `--verbose` and `--dry-run` flags without threading
//! them through every function signature. A tokio task-local holds the
//! context across await points; a thread-local backs the synchronous paths.

use std::cell::RefCell;
use std::future::Future;

thread_local! {
    static SYNC_CONTEXT: RefCell<ExecutionContext> = RefCell::new(ExecutionContext::default());
}

tokio::task_local! {
    static ASYNC_CONTEXT: ExecutionContext;
}

#[derive(Clone, Copy, Default)]
pub struct ExecutionContext {
    /// Echo git commands as they are executed
    pub verbose: bool,
    /// Preview mutations without executing them
    pub dry_run: bool,
}

impl ExecutionContext {
    pub fn new(verbose: bool, dry_run: bool) -> Self {
        Self { verbose, dry_run }
    }

    /// Seed the thread-local context for synchronous code paths.
    pub fn init(verbose: bool, dry_run: bool) {
        SYNC_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = ExecutionContext { verbose, dry_run };
        });
    }

    pub fn is_verbose() -> bool {
        if let Ok(verbose) = ASYNC_CONTEXT.try_with(|ctx| ctx.verbose) {
            return verbose;
        }
        SYNC_CONTEXT.with(|ctx| ctx.borrow().verbose)
    }

    pub fn is_dry_run() -> bool {
        if let Ok(dry_run) = ASYNC_CONTEXT.try_with(|ctx| ctx.dry_run) {
            return dry_run;
        }
        SYNC_CONTEXT.with(|ctx| ctx.borrow().dry_run)
    }
}

/// Run an async block with the given context scoped across its await points.
pub async fn with_context<F, T>(ctx: ExecutionContext, f: F) -> T
where
    F: Future<Output = T>,
{
    ASYNC_CONTEXT.scope(ctx, f).await
}

/// True when prompting the user is disallowed.
///
/// `STACKIT_TEST_NO_INTERACTIVE` and `STACKIT_NON_INTERACTIVE` both disable
/// prompts; interactive paths must fail fast instead of blocking.
pub fn non_interactive() -> bool {
    let set = |name: &str| {
        std::env::var(name)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    };
    set("STACKIT_TEST_NO_INTERACTIVE") || set("STACKIT_NON_INTERACTIVE")
}
