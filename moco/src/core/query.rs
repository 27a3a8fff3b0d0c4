//! Filtering, sorting and limiting over discovered runs.
//!
//! All functions are pure: the current time is passed in where durations of
//! running runs matter.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::error::MocoError;
use crate::core::types::{RunRecord, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Start time, most recent first.
    #[default]
    Date,
    Branch,
    /// Running first, then by exit status.
    Status,
    Duration,
}

impl FromStr for RunStatus {
    type Err = MocoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" | "failed" => Ok(Self::Failure),
            _ => Err(MocoError::config("status", s, "success, failure or running")),
        }
    }
}

/// Conjunction of optional predicates; an empty filter keeps everything.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Substring of the branch name.
    pub branch: Option<String>,
    pub status: Option<RunStatus>,
    /// Keep runs started at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub command: Option<Regex>,
}

impl RunFilter {
    pub fn matches(&self, run: &RunRecord) -> bool {
        if let Some(branch) = &self.branch
            && !run.branch.contains(branch.as_str())
        {
            return false;
        }
        if let Some(status) = self.status
            && run.status() != status
        {
            return false;
        }
        if let Some(since) = self.since
            && run.start_time < since
        {
            return false;
        }
        if let Some(re) = &self.command
            && !re.is_match(&run.command)
        {
            return false;
        }
        true
    }
}

/// Compile a command filter, mapping syntax errors to a config error.
pub fn command_pattern(pattern: &str) -> Result<Regex, MocoError> {
    Regex::new(pattern).map_err(|_| MocoError::config("command pattern", pattern, "a valid regex"))
}

pub fn filter_runs(runs: Vec<RunRecord>, filter: &RunFilter) -> Vec<RunRecord> {
    runs.into_iter().filter(|run| filter.matches(run)).collect()
}

/// Stable sort; `reverse` inverts the key's natural order.
pub fn sort_runs(runs: &mut [RunRecord], key: SortKey, reverse: bool, now: DateTime<Utc>) {
    runs.sort_by(|a, b| {
        let ord = compare(a, b, key, now);
        if reverse { ord.reverse() } else { ord }
    });
}

fn compare(a: &RunRecord, b: &RunRecord, key: SortKey, now: DateTime<Utc>) -> Ordering {
    match key {
        SortKey::Date => b.start_time.cmp(&a.start_time),
        SortKey::Branch => a.branch.cmp(&b.branch),
        SortKey::Status => status_rank(a).cmp(&status_rank(b)),
        SortKey::Duration => a.duration(now).cmp(&b.duration(now)),
    }
}

fn status_rank(run: &RunRecord) -> (bool, i32) {
    match run.exit_status {
        None => (false, 0),
        Some(code) => (true, code),
    }
}

/// Keep the first `limit` runs; zero means unlimited.
pub fn limit_runs(runs: &mut Vec<RunRecord>, limit: usize) {
    if limit > 0 {
        runs.truncate(limit);
    }
}
