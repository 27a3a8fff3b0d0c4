//! Side-effecting helpers: git, records, child processes, archives, config.

pub mod bundle;
pub mod config;
pub mod discovery;
pub mod git;
pub mod process;
pub mod record;
