//! Experiment tracking for command-line workloads.
//!
//! `moco run` executes a command inside a timestamped run directory and
//! records the git state before the run and the outcome after it. The other
//! commands read those records back. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic over run records (naming, filtering, sorting,
//!   archive selection, statistics). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, record files, child
//!   processes, archives, configuration).
//!
//! Orchestration modules ([`run`], [`list`], [`show`], [`status`],
//! [`archive`]) coordinate core logic with I/O to implement CLI commands;
//! [`render`] turns their results into text.

pub mod archive;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod list;
pub mod logging;
pub mod render;
pub mod run;
pub mod show;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
