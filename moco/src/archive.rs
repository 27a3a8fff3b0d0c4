//! `moco archive`: compress old runs and optionally delete the originals.
//!
//! Inputs are validated before anything touches the filesystem. Nothing is
//! written in dry-run mode, and nothing is written unless `confirm` agrees.
//! A failure on one run is recorded and the remaining runs are still
//! processed.

use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, Utc};
use tracing::{info, instrument, warn};

use crate::core::age::cutoff_from;
use crate::core::retention::{ArchiveSelection, ArchiveStatus, select_for_archive};
use crate::core::types::RunRecord;
use crate::io::bundle::{ArchiveFormat, IndexEntry, append_index, write_archive};
use crate::io::config::Config;
use crate::io::discovery::{ParsePolicy, discover};
use crate::io::record::parse_record;

#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub base_dir: PathBuf,
    pub record_file: String,
    /// Explicit run directories. When non-empty, age and status filters are ignored.
    pub runs: Vec<PathBuf>,
    /// Age spec; `None` or empty admits runs of any age.
    pub older_than: Option<String>,
    pub status: ArchiveStatus,
    pub format: ArchiveFormat,
    pub dest: PathBuf,
    pub delete: bool,
    pub dry_run: bool,
}

impl ArchiveRequest {
    pub fn new(cfg: &Config) -> Self {
        Self {
            base_dir: cfg.paths.base_dir.clone(),
            record_file: cfg.paths.summary_file.clone(),
            runs: Vec::new(),
            older_than: Some(cfg.archive.older_than.clone()),
            status: cfg.archive.status,
            format: cfg.archive.format,
            dest: cfg.archive.to.clone(),
            delete: cfg.archive.delete,
            dry_run: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub selected: Vec<RunRecord>,
    pub archives: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    /// The user declined the confirmation prompt.
    pub cancelled: bool,
    /// Non-fatal per-run failures.
    pub errors: Vec<String>,
}

/// Select runs, then (unless dry-run or declined) archive them.
///
/// `confirm` sees the selection and decides whether to proceed.
#[instrument(skip_all, fields(format = request.format.extension(), dry_run = request.dry_run))]
pub fn archive_runs<C>(request: &ArchiveRequest, now: DateTime<Utc>, confirm: C) -> Result<ArchiveReport>
where
    C: FnOnce(&[RunRecord]) -> Result<bool>,
{
    let selection = ArchiveSelection {
        cutoff: cutoff_from(now, request.older_than.as_deref())?,
        status: request.status,
    };

    let mut report = ArchiveReport {
        selected: select_runs(request, &selection)?,
        ..ArchiveReport::default()
    };
    if report.selected.is_empty() {
        info!("no runs to archive");
        return Ok(report);
    }
    if request.dry_run {
        return Ok(report);
    }
    if !confirm(&report.selected)? {
        report.cancelled = true;
        return Ok(report);
    }

    let mut index = Vec::new();
    for run in &report.selected {
        let archive = match write_archive(&run.directory, &request.dest, request.format) {
            Ok(path) => path,
            Err(err) => {
                warn!(run = %run.directory.display(), err = %format!("{err:#}"), "archive failed");
                report.errors.push(format!("{}: {err:#}", run.directory.display()));
                continue;
            }
        };
        info!(run = %run.directory.display(), archive = %archive.display(), "archived run");
        index.push(IndexEntry {
            archived_at: Local::now(),
            run_name: run.name(),
            archive_file: archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status: run.status_label(),
            command: run.command.clone(),
        });
        report.archives.push(archive);

        if request.delete {
            match fs::remove_dir_all(&run.directory) {
                Ok(()) => report.deleted.push(run.directory.clone()),
                Err(err) => {
                    warn!(run = %run.directory.display(), err = %err, "could not delete run");
                    report
                        .errors
                        .push(format!("delete {}: {err}", run.directory.display()));
                }
            }
        }
    }

    if let Err(err) = append_index(&request.dest, &index) {
        warn!(err = %format!("{err:#}"), "could not update archive index");
    }
    Ok(report)
}

fn select_runs(request: &ArchiveRequest, selection: &ArchiveSelection) -> Result<Vec<RunRecord>> {
    if request.runs.is_empty() {
        let discovered = discover(&request.base_dir, &request.record_file, ParsePolicy::Abort)?;
        return Ok(select_for_archive(&discovered.runs, selection));
    }

    let mut selected = Vec::new();
    for target in &request.runs {
        let dir = if target.is_dir() {
            target.clone()
        } else {
            request.base_dir.join(target)
        };
        if !dir.is_dir() {
            return Err(anyhow!("run not found: {}", target.display()));
        }
        let run = parse_record(&dir.join(&request.record_file))?;
        if run.is_running() {
            warn!(run = %dir.display(), "skipping run that is still running");
            continue;
        }
        selected.push(run);
    }
    Ok(selected)
}
