//! `moco list`: discover, filter, sort and limit runs.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::core::query::{RunFilter, SortKey, filter_runs, limit_runs, sort_runs};
use crate::core::types::RunRecord;
use crate::io::discovery::{ParsePolicy, discover};

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub base_dir: PathBuf,
    pub record_file: String,
    pub filter: RunFilter,
    pub sort: SortKey,
    pub reverse: bool,
    /// Zero means unlimited.
    pub limit: usize,
}

/// Runs matching the request, in display order. Any unreadable record aborts.
#[instrument(skip_all, fields(base_dir = %request.base_dir.display()))]
pub fn list_runs(request: &ListRequest, now: DateTime<Utc>) -> Result<Vec<RunRecord>> {
    let discovered = discover(&request.base_dir, &request.record_file, ParsePolicy::Abort)?;
    let mut runs = filter_runs(discovered.runs, &request.filter);
    sort_runs(&mut runs, request.sort, request.reverse, now);
    limit_runs(&mut runs, request.limit);
    Ok(runs)
}
