//! Terminal output and prompts.

mod conflict;
mod output;
mod prompt;

pub use conflict::display_conflict_halt;
pub use output::{
    branch_name, bullet, error, spinner, spinner_success, spinner_warning, step, success, success_bold, warning,
};
pub use prompt::{confirm, input_branch_name, select_indices};
