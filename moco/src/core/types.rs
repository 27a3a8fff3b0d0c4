//! Shared types for run records and repository state.
//!
//! These types carry no I/O. Everything time-dependent takes `now` explicitly
//! so that classification and durations stay deterministic under test.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel branch name recorded when HEAD is detached.
pub const DETACHED_HEAD: &str = "detached-HEAD";

/// One executed (or still executing) command, as recovered from its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// Run directory, relative to wherever discovery was rooted.
    pub directory: PathBuf,
    /// Argument vector joined with single spaces. Display only.
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// `None` until the results block has been written.
    pub exit_status: Option<i32>,
    pub interrupted: bool,
    pub branch: String,
    pub commit_hash: String,
    pub hostname: Option<String>,
    pub working_directory: Option<String>,
}

/// Mutually exclusive status class of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl RunRecord {
    pub fn is_running(&self) -> bool {
        self.exit_status.is_none()
    }

    pub fn status(&self) -> RunStatus {
        match self.exit_status {
            None => RunStatus::Running,
            Some(0) => RunStatus::Success,
            Some(_) => RunStatus::Failure,
        }
    }

    /// Elapsed time: end minus start once finished, `now` minus start while running.
    pub fn duration(&self, now: DateTime<Utc>) -> TimeDelta {
        let end = match (self.exit_status, self.end_time) {
            (Some(_), Some(end)) => end,
            (Some(_), None) => self.start_time,
            (None, _) => now,
        };
        (end - self.start_time).max(TimeDelta::zero())
    }

    /// Final path component of the run directory.
    pub fn name(&self) -> String {
        self.directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.directory.display().to_string())
    }

    /// Label used by tables and CSV: `Running`, `Success`, `Interrupted` or `Failed (exit: N)`.
    pub fn status_label(&self) -> String {
        match self.exit_status {
            None => "Running".to_string(),
            Some(0) => "Success".to_string(),
            Some(_) if self.interrupted => "Interrupted".to_string(),
            Some(code) => format!("Failed (exit: {code})"),
        }
    }
}

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Metadata of the commit HEAD points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub author: String,
    pub message: String,
    pub date: DateTime<FixedOffset>,
}

/// Snapshot of the working tree. Recomputed on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub is_valid: bool,
    /// Branch name, or [`DETACHED_HEAD`].
    pub branch: String,
    pub short_hash: String,
    pub full_hash: String,
    pub is_dirty: bool,
    pub changes: Vec<StatusEntry>,
    pub last_commit: Option<CommitInfo>,
}

impl RepoStatus {
    /// Status reported when the directory is not a git work tree.
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            branch: String::new(),
            short_hash: String::new(),
            full_hash: String::new(),
            is_dirty: false,
            changes: Vec::new(),
            last_commit: None,
        }
    }
}
