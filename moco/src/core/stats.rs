//! Project-level aggregation for `moco status`.

use serde::Serialize;

use crate::core::types::{RunRecord, RunStatus};

/// How many recent runs a status report lists.
pub const RECENT_RUNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    /// Runs without a results block, plus records that could not be read.
    pub running: usize,
    pub unreadable: usize,
    pub disk_usage_bytes: u64,
    pub running_runs: Vec<RunRecord>,
    /// Most recent first.
    pub recent_runs: Vec<RunRecord>,
}

impl ProjectStats {
    /// Percentage of all runs that succeeded; `None` when there are no runs.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.success as f64 / self.total as f64 * 100.0)
    }
}

/// Aggregate parsed runs. `unreadable` records are indeterminate and counted as running.
pub fn project_stats(runs: &[RunRecord], unreadable: usize, disk_usage_bytes: u64) -> ProjectStats {
    let mut success = 0;
    let mut failure = 0;
    let mut running_runs = Vec::new();
    for run in runs {
        match run.status() {
            RunStatus::Success => success += 1,
            RunStatus::Failure => failure += 1,
            RunStatus::Running => running_runs.push(run.clone()),
        }
    }

    let mut recent_runs = runs.to_vec();
    recent_runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    recent_runs.truncate(RECENT_RUNS);

    ProjectStats {
        total: runs.len() + unreadable,
        success,
        failure,
        running: running_runs.len() + unreadable,
        unreadable,
        disk_usage_bytes,
        running_runs,
        recent_runs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::finished_run;
    use chrono::{TimeDelta, TimeZone, Utc};

    #[test]
    fn counts_unreadable_records_as_running() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let runs = vec![
            finished_run(base, "main", "a", Some(0), 1),
            finished_run(base + TimeDelta::minutes(1), "main", "b", Some(1), 1),
            finished_run(base + TimeDelta::minutes(2), "main", "c", None, 0),
        ];
        let stats = project_stats(&runs, 2, 4096);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failure, 1);
        assert_eq!(stats.running, 3);
        assert_eq!(stats.running_runs.len(), 1);
        assert_eq!(stats.success_rate(), Some(20.0));
    }

    #[test]
    fn recent_runs_are_newest_first_and_capped() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let runs: Vec<_> = (0..8)
            .map(|i| finished_run(base + TimeDelta::hours(i), "main", &format!("run {i}"), Some(0), 1))
            .collect();
        let stats = project_stats(&runs, 0, 0);
        assert_eq!(stats.recent_runs.len(), RECENT_RUNS);
        assert_eq!(stats.recent_runs[0].command, "run 7");
        assert_eq!(stats.recent_runs[4].command, "run 3");
    }

    #[test]
    fn empty_project_has_no_success_rate() {
        assert_eq!(project_stats(&[], 0, 0).success_rate(), None);
    }
}
