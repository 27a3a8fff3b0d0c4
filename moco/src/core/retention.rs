//! Which runs are eligible for archiving.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::error::MocoError;
use crate::core::types::{RunRecord, RunStatus};

/// Status class an archive pass may target. Running runs are never eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    #[default]
    All,
    Success,
    Failure,
}

impl FromStr for ArchiveStatus {
    type Err = MocoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "success" => Ok(Self::Success),
            "failure" | "failed" => Ok(Self::Failure),
            _ => Err(MocoError::config("archive status", s, "all, success or failure")),
        }
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Success => "success",
            Self::Failure => "failure",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveSelection {
    /// Runs must have started strictly before this instant; `None` admits any age.
    pub cutoff: Option<DateTime<Utc>>,
    pub status: ArchiveStatus,
}

impl ArchiveSelection {
    pub fn admits(&self, run: &RunRecord) -> bool {
        let status_ok = match (self.status, run.status()) {
            (_, RunStatus::Running) => false,
            (ArchiveStatus::All, _) => true,
            (ArchiveStatus::Success, status) => status == RunStatus::Success,
            (ArchiveStatus::Failure, status) => status == RunStatus::Failure,
        };
        let age_ok = self.cutoff.is_none_or(|cutoff| run.start_time < cutoff);
        status_ok && age_ok
    }
}

pub fn select_for_archive(runs: &[RunRecord], selection: &ArchiveSelection) -> Vec<RunRecord> {
    runs.iter()
        .filter(|run| selection.admits(run))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::finished_run;
    use chrono::{TimeDelta, TimeZone};

    fn sample() -> Vec<RunRecord> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        vec![
            finished_run(base, "main", "ok", Some(0), 1),
            finished_run(base + TimeDelta::days(10), "main", "bad", Some(2), 1),
            finished_run(base + TimeDelta::days(20), "main", "live", None, 0),
            finished_run(base + TimeDelta::days(30), "main", "recent", Some(0), 1),
        ]
    }

    #[test]
    fn far_future_cutoff_selects_every_finished_run() {
        let runs = sample();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let selection = ArchiveSelection {
            cutoff: Some(now + TimeDelta::days(365)),
            status: ArchiveStatus::All,
        };
        let selected = select_for_archive(&runs, &selection);
        assert_eq!(selected.len(), 3);
        assert!(selected.iter().all(|run| !run.is_running()));
    }

    #[test]
    fn cutoff_is_exclusive() {
        let runs = sample();
        let selection = ArchiveSelection {
            cutoff: Some(runs[1].start_time),
            status: ArchiveStatus::All,
        };
        let selected = select_for_archive(&runs, &selection);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].command, "ok");
    }

    #[test]
    fn status_narrows_selection() {
        let runs = sample();
        let failures = ArchiveSelection {
            cutoff: None,
            status: ArchiveStatus::Failure,
        };
        let selected = select_for_archive(&runs, &failures);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].command, "bad");

        let successes = ArchiveSelection {
            status: ArchiveStatus::Success,
            ..failures
        };
        assert_eq!(select_for_archive(&runs, &successes).len(), 2);
    }

    #[test]
    fn running_is_not_an_archive_status() {
        assert!(matches!(
            "running".parse::<ArchiveStatus>(),
            Err(MocoError::Config { .. })
        ));
        assert_eq!("".parse::<ArchiveStatus>().unwrap(), ArchiveStatus::All);
    }
}
