//! `moco status`: repository state plus aggregate run statistics.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::core::error::MocoError;
use crate::core::stats::project_stats;
use crate::core::types::RepoStatus;
use crate::io::discovery::{ParsePolicy, discover, disk_usage};
use crate::io::git::Git;
use crate::render::StatusReport;

/// Build the status report. Unreadable records are counted as running rather
/// than failing the command; outside a git work tree the repository section
/// is reported as invalid.
#[instrument(skip_all, fields(base_dir = %base_dir.display()))]
pub fn project_status(
    workdir: &Path,
    base_dir: &Path,
    record_file: &str,
    now: DateTime<Utc>,
) -> Result<StatusReport> {
    let repository = match Git::new(workdir).repository_status() {
        Ok(status) => status,
        Err(err)
            if matches!(
                err.downcast_ref::<MocoError>(),
                Some(MocoError::NotARepository { .. })
            ) =>
        {
            RepoStatus::invalid()
        }
        Err(err) => return Err(err),
    };

    let discovered = discover(base_dir, record_file, ParsePolicy::Tolerate)?;
    let usage = disk_usage(base_dir)?;
    let stats = project_stats(&discovered.runs, discovered.unreadable.len(), usage);
    let unreadable = discovered
        .unreadable
        .iter()
        .map(|(dir, err)| format!("{}: {err:#}", dir.display()))
        .collect();

    Ok(StatusReport {
        repository,
        base_dir: base_dir.to_path_buf(),
        stats,
        unreadable,
        now,
    })
}
