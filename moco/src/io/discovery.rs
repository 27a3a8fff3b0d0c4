//! Scan the base directory for run directories and load their records.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::naming::parse_run_dir_name;
use crate::core::types::RunRecord;
use crate::io::record::parse_record;

/// What to do when a run directory's record cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Propagate the first failure.
    Abort,
    /// Collect failures and keep going.
    Tolerate,
}

#[derive(Debug, Default)]
pub struct Discovered {
    /// In directory-name order, which is start-time order.
    pub runs: Vec<RunRecord>,
    /// Run directories whose records failed to parse (tolerant policy only).
    pub unreadable: Vec<(PathBuf, anyhow::Error)>,
}

/// Load every run under `base_dir`. A missing base directory yields no runs.
///
/// Only immediate subdirectories whose names follow the run naming scheme are
/// considered; everything else is skipped.
#[instrument(skip_all, fields(base_dir = %base_dir.display(), ?policy))]
pub fn discover(base_dir: &Path, record_file: &str, policy: ParsePolicy) -> Result<Discovered> {
    let mut discovered = Discovered::default();
    for dir in run_dirs(base_dir)? {
        let record = dir.join(record_file);
        match parse_record(&record) {
            Ok(run) => discovered.runs.push(run),
            Err(err) => match policy {
                ParsePolicy::Abort => {
                    return Err(err).with_context(|| format!("load run {}", dir.display()));
                }
                ParsePolicy::Tolerate => {
                    warn!(dir = %dir.display(), err = %format!("{err:#}"), "unreadable run record");
                    discovered.unreadable.push((dir, err));
                }
            },
        }
    }
    debug!(
        runs = discovered.runs.len(),
        unreadable = discovered.unreadable.len(),
        "discovery finished"
    );
    Ok(discovered)
}

/// Run directories under `base_dir`, sorted by name.
pub fn run_dirs(base_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("base directory does not exist");
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read directory {}", base_dir.display()));
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read directory {}", base_dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if parse_run_dir_name(name).is_none() {
            debug!(name, "skipping non-run directory");
            continue;
        }
        dirs.push(base_dir.join(name));
    }
    dirs.sort();
    Ok(dirs)
}

/// Total size in bytes of all regular files under `dir` (0 if it does not exist).
pub fn disk_usage(dir: &Path) -> Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .with_context(|| format!("stat {}", entry.path().display()))?;
            total += meta.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_run;
    use chrono::{TimeDelta, TimeZone, Utc};

    #[test]
    fn missing_base_dir_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let found = discover(&temp.path().join("runs"), "summary.md", ParsePolicy::Abort)
            .expect("discover");
        assert!(found.runs.is_empty());
        assert!(found.unreadable.is_empty());
    }

    #[test]
    fn loads_runs_in_name_order_and_skips_foreign_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("runs");
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        for (i, code) in [Some(0), Some(1), None].into_iter().enumerate() {
            let at = start + TimeDelta::hours(2 - i as i64);
            write_run(&base, "summary.md", at, "main", &format!("job {i}"), code).expect("run");
        }
        fs::create_dir_all(base.join("scratch")).expect("mkdir");
        fs::write(base.join("notes.txt"), "x").expect("write");

        let found = discover(&base, "summary.md", ParsePolicy::Abort).expect("discover");
        let commands: Vec<_> = found.runs.iter().map(|r| r.command.as_str()).collect();
        assert_eq!(commands, ["job 2", "job 1", "job 0"]);
        assert!(found.runs[0].is_running());
        assert!(found.runs[0].directory.starts_with(&base));
    }

    #[test]
    fn parse_failures_abort_or_are_collected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("runs");
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        write_run(&base, "summary.md", start, "main", "ok", Some(0)).expect("run");
        let broken = base.join("2025-02-02T00:00:00.000_main_abcdef0");
        fs::create_dir_all(&broken).expect("mkdir");
        fs::write(broken.join("summary.md"), "- **Branch**: `main\n").expect("write");

        assert!(discover(&base, "summary.md", ParsePolicy::Abort).is_err());

        let found = discover(&base, "summary.md", ParsePolicy::Tolerate).expect("discover");
        assert_eq!(found.runs.len(), 1);
        assert_eq!(found.unreadable.len(), 1);
        assert_eq!(found.unreadable[0].0, broken);
    }

    #[test]
    fn disk_usage_sums_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("a/b")).expect("mkdir");
        fs::write(temp.path().join("a/x"), [0u8; 10]).expect("write");
        fs::write(temp.path().join("a/b/y"), [0u8; 5]).expect("write");
        assert_eq!(disk_usage(temp.path()).expect("usage"), 15);
        assert_eq!(disk_usage(&temp.path().join("missing")).expect("usage"), 0);
    }
}
