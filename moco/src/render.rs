//! Text, JSON, CSV and Markdown renderings of runs and status reports.
//!
//! One render function per format tag; all of them return the full output as
//! a `String` so commands decide where it goes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::age::format_duration;
use crate::core::stats::ProjectStats;
use crate::core::types::{RepoStatus, RunRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Csv,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    /// Repository line and counts only.
    Minimal,
    #[default]
    Normal,
    /// Adds last commit details and unreadable records.
    Full,
}

pub fn render_runs(format: ListFormat, runs: &[RunRecord], now: DateTime<Utc>) -> Result<String> {
    match format {
        ListFormat::Table => Ok(runs_table(runs, now)),
        ListFormat::Json => runs_json(runs, now),
        ListFormat::Csv => Ok(runs_csv(runs, now)),
        ListFormat::Plain => Ok(runs_plain(runs)),
    }
}

fn runs_table(runs: &[RunRecord], now: DateTime<Utc>) -> String {
    let rows: Vec<[String; 4]> = runs
        .iter()
        .map(|run| {
            [
                run.directory.display().to_string(),
                run.status_label(),
                format_duration(run.duration(now)),
                run.command.clone(),
            ]
        })
        .collect();
    table(&["Directory", "Status", "Duration", "Command"], &rows)
}

fn table<const N: usize>(header: &[&str; N], rows: &[[String; N]]) -> String {
    let mut widths = [0usize; N];
    for (width, cell) in widths.iter_mut().zip(header) {
        *width = cell.chars().count();
    }
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &widths, header);
    let rules = widths.map(|width| "-".repeat(width));
    push_row(&mut out, &widths, &rules);
    for row in rows {
        push_row(&mut out, &widths, row);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, widths: &[usize], cells: &[S]) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let cell = cell.as_ref();
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        line.push_str(&" ".repeat(width.saturating_sub(cell.chars().count())));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

#[derive(Serialize)]
struct RunView<'a> {
    directory: PathBuf,
    command: &'a str,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration: String,
    status: String,
    exit_status: Option<i32>,
    is_running: bool,
    interrupted: bool,
    branch: &'a str,
    commit_hash: &'a str,
}

impl<'a> RunView<'a> {
    fn new(run: &'a RunRecord, now: DateTime<Utc>) -> Self {
        Self {
            directory: run.directory.clone(),
            command: &run.command,
            start_time: run.start_time,
            end_time: run.end_time,
            duration: format_duration(run.duration(now)),
            status: run.status_label(),
            exit_status: run.exit_status,
            is_running: run.is_running(),
            interrupted: run.interrupted,
            branch: &run.branch,
            commit_hash: &run.commit_hash,
        }
    }
}

#[derive(Serialize)]
struct RunList<'a> {
    runs: Vec<RunView<'a>>,
    count: usize,
}

fn runs_json(runs: &[RunRecord], now: DateTime<Utc>) -> Result<String> {
    let list = RunList {
        runs: runs.iter().map(|run| RunView::new(run, now)).collect(),
        count: runs.len(),
    };
    let mut out = serde_json::to_string_pretty(&list).context("serialize runs json")?;
    out.push('\n');
    Ok(out)
}

fn runs_csv(runs: &[RunRecord], now: DateTime<Utc>) -> String {
    let mut out = String::from("Directory,Timestamp,Branch,CommitHash,Status,Duration,Command\n");
    for run in runs {
        let fields = [
            run.directory.display().to_string(),
            local_time(run.start_time),
            run.branch.clone(),
            run.commit_hash.clone(),
            run.status_label(),
            format_duration(run.duration(now)),
            run.command.clone(),
        ];
        let line: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn runs_plain(runs: &[RunRecord]) -> String {
    runs.iter()
        .map(|run| format!("{}\n", run.directory.display()))
        .collect()
}

/// Everything `moco status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub repository: RepoStatus,
    pub base_dir: PathBuf,
    pub stats: ProjectStats,
    /// Run directories whose records could not be read.
    pub unreadable: Vec<String>,
    #[serde(skip)]
    pub now: DateTime<Utc>,
}

pub fn render_status(format: StatusFormat, level: StatusLevel, report: &StatusReport) -> Result<String> {
    match format {
        StatusFormat::Text => Ok(status_text(level, report)),
        StatusFormat::Json => status_json(level, report),
        StatusFormat::Markdown => Ok(status_markdown(level, report)),
    }
}

fn repo_line(repo: &RepoStatus) -> String {
    if !repo.is_valid {
        return "not a git repository".to_string();
    }
    let tree = if repo.is_dirty {
        format!("dirty ({} changed)", repo.changes.len())
    } else {
        "clean".to_string()
    };
    format!("{} @ {} ({tree})", repo.branch, repo.short_hash)
}

fn success_rate(stats: &ProjectStats) -> String {
    stats
        .success_rate()
        .map(|rate| format!("{rate:.1}%"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn status_text(level: StatusLevel, report: &StatusReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();
    out.push_str(&format!("Repository: {}\n", repo_line(&report.repository)));
    if level == StatusLevel::Full
        && let Some(commit) = &report.repository.last_commit
    {
        out.push_str(&format!(
            "Last commit: {} ({}, {})\n",
            commit.message.lines().next().unwrap_or(""),
            commit.author,
            commit.date.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out.push_str(&format!("Runs directory: {}\n", report.base_dir.display()));
    out.push_str(&format!(
        "Runs: {} total, {} succeeded, {} failed, {} running\n",
        stats.total, stats.success, stats.failure, stats.running
    ));
    out.push_str(&format!("Success rate: {}\n", success_rate(stats)));
    out.push_str(&format!("Disk usage: {}\n", format_bytes(stats.disk_usage_bytes)));
    if level == StatusLevel::Minimal {
        return out;
    }

    if !stats.running_runs.is_empty() {
        out.push_str("\nRunning:\n");
        for run in &stats.running_runs {
            out.push_str(&format!(
                "  {}  for {}  {}\n",
                run.name(),
                format_duration(run.duration(report.now)),
                run.command
            ));
        }
    }
    if !stats.recent_runs.is_empty() {
        out.push_str("\nRecent runs:\n");
        let rows: Vec<[String; 4]> = stats
            .recent_runs
            .iter()
            .map(|run| {
                [
                    run.name(),
                    run.status_label(),
                    format_duration(run.duration(report.now)),
                    run.command.clone(),
                ]
            })
            .collect();
        for line in table(&["Run", "Status", "Duration", "Command"], &rows).lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    if level == StatusLevel::Full && !report.unreadable.is_empty() {
        out.push_str("\nUnreadable records:\n");
        for dir in &report.unreadable {
            out.push_str(&format!("  {dir}\n"));
        }
    }
    out
}

fn status_markdown(level: StatusLevel, report: &StatusReport) -> String {
    let stats = &report.stats;
    let mut out = String::from("# Project Status\n\n## Repository\n");
    out.push_str(&format!("- **State**: {}\n", repo_line(&report.repository)));
    if level == StatusLevel::Full
        && let Some(commit) = &report.repository.last_commit
    {
        out.push_str(&format!(
            "- **Last commit**: {} ({}, {})\n",
            commit.message.lines().next().unwrap_or(""),
            commit.author,
            commit.date.to_rfc3339()
        ));
    }
    out.push_str("\n## Runs\n");
    out.push_str(&format!("- **Directory**: `{}`\n", report.base_dir.display()));
    out.push_str(&format!("- **Total**: {}\n", stats.total));
    out.push_str(&format!("- **Succeeded**: {}\n", stats.success));
    out.push_str(&format!("- **Failed**: {}\n", stats.failure));
    out.push_str(&format!("- **Running**: {}\n", stats.running));
    out.push_str(&format!("- **Success rate**: {}\n", success_rate(stats)));
    out.push_str(&format!(
        "- **Disk usage**: {}\n",
        format_bytes(stats.disk_usage_bytes)
    ));
    if level == StatusLevel::Minimal || stats.recent_runs.is_empty() {
        return out;
    }

    out.push_str("\n## Recent Runs\n\n| Run | Status | Duration | Command |\n|---|---|---|---|\n");
    for run in &stats.recent_runs {
        out.push_str(&format!(
            "| {} | {} | {} | `{}` |\n",
            run.name(),
            run.status_label(),
            format_duration(run.duration(report.now)),
            run.command.replace('|', "\\|")
        ));
    }
    out
}

fn status_json(level: StatusLevel, report: &StatusReport) -> Result<String> {
    let mut value = serde_json::to_value(report).context("serialize status json")?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "success_rate".to_string(),
            serde_json::json!(report.stats.success_rate()),
        );
        if level == StatusLevel::Minimal
            && let Some(stats) = map.get_mut("stats").and_then(|s| s.as_object_mut())
        {
            stats.remove("running_runs");
            stats.remove("recent_runs");
        }
        if level != StatusLevel::Full {
            map.remove("unreadable");
            if let Some(repo) = map.get_mut("repository").and_then(|r| r.as_object_mut()) {
                repo.remove("last_commit");
            }
        }
    }
    let mut out = serde_json::to_string_pretty(&value).context("serialize status json")?;
    out.push('\n');
    Ok(out)
}

/// `512 B`, `1.5 KiB`, `3.2 MiB`, ...
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
