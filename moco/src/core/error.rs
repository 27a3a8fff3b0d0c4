//! Typed failures that callers branch on.
//!
//! Orchestration code returns `anyhow::Result` and wraps these where a caller
//! (or `main`) needs to recover the kind via `downcast_ref::<MocoError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MocoError {
    #[error("repository has uncommitted changes; commit them or rerun with --force")]
    DirtyRepository,

    #[error("{} is not inside a git work tree", path.display())]
    NotARepository { path: PathBuf },

    #[error("invalid {what} '{value}': expected {expected}")]
    Config {
        what: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{}: invalid {field}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        field: &'static str,
        reason: String,
    },

    #[error("failed to start '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with status {code}")]
    CommandFailed { code: i32 },
}

impl MocoError {
    pub fn config(what: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        Self::Config {
            what,
            value: value.into(),
            expected,
        }
    }
}
