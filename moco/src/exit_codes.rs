//! Stable exit codes for moco commands.

use crate::core::error::MocoError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Precondition, configuration, I/O or parse failure.
pub const INVALID: i32 = 1;
/// The run was stopped by SIGINT/SIGTERM (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;

/// Exit code for a failed command: the child's own code when a run failed,
/// [`INVALID`] otherwise.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<MocoError>() {
        Some(MocoError::CommandFailed { code }) if *code != OK => *code,
        _ => INVALID,
    }
}
