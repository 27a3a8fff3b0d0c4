//! The per-run Markdown record.
//!
//! A record is written in two phases: the initial block before the child
//! starts, and the results block appended after it terminates. A record
//! without a results block describes a run that is still going (or whose
//! runner died). Label text is the on-disk contract; old records must keep
//! parsing.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use tracing::{debug, instrument, warn};

use crate::core::age::format_duration;
use crate::core::error::MocoError;
use crate::core::types::{RepoStatus, RunRecord};
use crate::io::git::{Git, render_git_status};

const FENCE: &str = "```";
const LABEL_DATETIME: &str = "- **Execution datetime**: ";
const LABEL_BRANCH: &str = "- **Branch**: ";
const LABEL_COMMIT: &str = "- **Commit hash**: ";
const LABEL_COMMAND: &str = "- **Command**: ";
const LABEL_HOSTNAME: &str = "- **Hostname**: ";
const LABEL_WORKDIR: &str = "- **Working directory**: ";
const LABEL_FINISHED: &str = "- **Execution finished**: ";
const LABEL_ELAPSED: &str = "- **Execution time**: ";
const LABEL_EXIT: &str = "- **Exit status**: ";
const MARK_TERMINATED: &str = "**Terminated by user**";

/// Best-effort context captured next to the metadata. Each field already
/// holds a placeholder when its source could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDetails {
    pub hostname: String,
    pub commit_details: String,
    pub git_status: String,
    pub diff: String,
    pub system_info: String,
}

impl RecordDetails {
    #[instrument(skip_all)]
    pub fn gather(git: &Git, status: &RepoStatus) -> Self {
        let commit_details = git.commit_details().unwrap_or_else(|err| {
            warn!(err = %err, "could not read commit details");
            "Error retrieving commit details".to_string()
        });
        let diff = git.uncommitted_diff().unwrap_or_else(|err| {
            warn!(err = %err, "could not read uncommitted changes");
            "Error retrieving uncommitted changes".to_string()
        });
        Self {
            hostname: hostname(),
            commit_details,
            git_status: render_git_status(status),
            diff,
            system_info: system_info(),
        }
    }
}

/// Everything the initial block records.
#[derive(Debug, Clone)]
pub struct InitialBlock<'a> {
    pub start_time: DateTime<FixedOffset>,
    pub repo: &'a RepoStatus,
    pub command: &'a [String],
    pub working_directory: &'a Path,
    pub details: &'a RecordDetails,
}

/// Create the record and write the metadata block. Fails if the file cannot be created.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_initial_block(path: &Path, block: &InitialBlock<'_>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create record {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let details = block.details;

    let mut text = String::new();
    text.push_str("# Experiment Summary\n\n## Metadata\n");
    text.push_str(&format!("{LABEL_DATETIME}{}\n", rfc3339(&block.start_time)));
    text.push_str(&format!("{LABEL_BRANCH}`{}`\n", block.repo.branch));
    text.push_str(&format!("{LABEL_COMMIT}`{}`\n", block.repo.full_hash));
    text.push_str(&format!(
        "{LABEL_COMMAND}`{}`\n",
        escape_line(&block.command.join(" "))
    ));
    text.push_str(&format!("{LABEL_HOSTNAME}`{}`\n", details.hostname));
    text.push_str(&format!(
        "{LABEL_WORKDIR}`{}`\n",
        block.working_directory.display()
    ));
    push_fenced(&mut text, "Latest Commit Details", "diff", &details.commit_details);
    push_fenced(&mut text, "Git Status", "", &details.git_status);
    push_fenced(&mut text, "Uncommitted Changes (Diff)", "diff", &details.diff);
    push_fenced(&mut text, "Environment Info", "", &details.system_info);

    out.write_all(text.as_bytes())
        .with_context(|| format!("write record {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flush record {}", path.display()))?;
    debug!("wrote initial block");
    Ok(())
}

/// Append the results block to an existing record. Never creates the file.
#[instrument(skip_all, fields(path = %path.display(), exit_code = exit_code, interrupted = interrupted))]
pub fn append_results_block(
    path: &Path,
    start_time: DateTime<FixedOffset>,
    end_time: DateTime<FixedOffset>,
    exit_code: i32,
    interrupted: bool,
) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("open record {} for append", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut text = String::new();
    text.push_str("\n## Execution Results\n");
    text.push_str(&format!("{LABEL_FINISHED}{}\n", rfc3339(&end_time)));
    text.push_str(&format!(
        "{LABEL_ELAPSED}{}\n",
        format_duration(end_time - start_time)
    ));
    text.push_str(&format!("{LABEL_EXIT}{exit_code}\n"));
    if interrupted {
        text.push_str(&format!("- {MARK_TERMINATED}\n"));
    }

    out.write_all(text.as_bytes())
        .with_context(|| format!("append record {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flush record {}", path.display()))?;
    debug!("appended results block");
    Ok(())
}

/// Reconstruct a [`RunRecord`] from its file. The run directory is the file's parent.
pub fn parse_record(path: &Path) -> Result<RunRecord> {
    let file = File::open(path).with_context(|| format!("open record {}", path.display()))?;
    let reader = BufReader::new(file);

    let parse_err = |field: &'static str, reason: String| MocoError::Parse {
        path: path.to_path_buf(),
        field,
        reason,
    };

    let mut in_fence = false;
    let mut start_time = None;
    let mut end_time = None;
    let mut exit_status = None;
    let mut interrupted = false;
    let mut branch = String::new();
    let mut commit_hash = String::new();
    let mut command = String::new();
    let mut hostname = None;
    let mut working_directory = None;

    for line in reader.lines() {
        let line = line.with_context(|| format!("read record {}", path.display()))?;
        if line.starts_with(FENCE) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(value) = line.strip_prefix(LABEL_DATETIME) {
            start_time = Some(parse_time(value).map_err(|reason| parse_err("start time", reason))?);
        } else if let Some(value) = line.strip_prefix(LABEL_BRANCH) {
            branch = trim_backticks(value).map_err(|reason| parse_err("branch", reason))?;
        } else if let Some(value) = line.strip_prefix(LABEL_COMMIT) {
            commit_hash = trim_backticks(value).map_err(|reason| parse_err("commit hash", reason))?;
        } else if let Some(value) = line.strip_prefix(LABEL_COMMAND) {
            command = trim_backticks(value)
                .map(|value| unescape_line(&value))
                .map_err(|reason| parse_err("command", reason))?;
        } else if let Some(value) = line.strip_prefix(LABEL_HOSTNAME) {
            hostname = trim_backticks(value).ok();
        } else if let Some(value) = line.strip_prefix(LABEL_WORKDIR) {
            working_directory = trim_backticks(value).ok();
        } else if let Some(value) = line.strip_prefix(LABEL_FINISHED) {
            end_time = Some(parse_time(value).map_err(|reason| parse_err("end time", reason))?);
        } else if let Some(value) = line.strip_prefix(LABEL_EXIT) {
            let code = value
                .trim()
                .parse::<i32>()
                .map_err(|err| parse_err("exit status", format!("'{}': {err}", value.trim())))?;
            exit_status = Some(code);
        } else if line.contains(MARK_TERMINATED) {
            interrupted = true;
        }
    }

    let start_time =
        start_time.ok_or_else(|| parse_err("start time", "missing execution datetime".to_string()))?;
    let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

    Ok(RunRecord {
        directory,
        command,
        start_time,
        end_time,
        exit_status,
        interrupted,
        branch,
        commit_hash,
        hostname,
        working_directory,
    })
}

fn push_fenced(text: &mut String, heading: &str, lang: &str, body: &str) {
    text.push_str(&format!("\n## {heading}\n{FENCE}{lang}\n{body}"));
    if !body.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(FENCE);
    text.push('\n');
}

fn rfc3339(time: &DateTime<FixedOffset>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn parse_time(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| format!("'{}': {err}", value.trim()))
}

fn trim_backticks(value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    if value.len() < 2 || !value.starts_with('`') || !value.ends_with('`') {
        return Err(format!("expected a value wrapped in backticks, got '{value}'"));
    }
    Ok(value[1..value.len() - 1].to_string())
}

/// Keep a metadata value on one line: `\` becomes `\\`, CR and LF become `\r` and `\n`.
fn escape_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_line`]. Unknown escapes are kept verbatim.
fn unescape_line(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().trim().to_string();
    if name.is_empty() {
        debug!("hostname unavailable");
        return "unknown".to_string();
    }
    name
}

fn system_info() -> String {
    command_stdout("uname", &["-a"])
        .unwrap_or_else(|err| format!("Error retrieving system info: {err:#}"))
}

fn command_stdout(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("spawn {program}"))?;
    if !output.status.success() {
        anyhow::bail!("{program} exited with {}", output.status);
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        anyhow::bail!("{program} printed nothing");
    }
    Ok(text)
}
