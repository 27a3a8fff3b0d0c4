//! Git adapter.
//!
//! Every query shells out to `git` in the wrapped working directory. Nothing is
//! cached; callers ask again when they need fresh state.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use tracing::{debug, instrument, warn};

use crate::core::error::MocoError;
use crate::core::naming::short_hash;
use crate::core::types::{CommitInfo, DETACHED_HEAD, RepoStatus, StatusEntry};

pub const NO_UNCOMMITTED_CHANGES: &str = "[No uncommitted changes]\n";
pub const NO_COMMIT_DETAILS: &str = "[No commit details]\n";

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn is_work_tree(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
            .unwrap_or(false)
    }

    /// Read branch, HEAD hash, dirtiness and the latest commit.
    ///
    /// Fails with [`MocoError::NotARepository`] outside a work tree. The last
    /// commit is best-effort and left unset when it cannot be read.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn repository_status(&self) -> Result<RepoStatus> {
        if !self.is_work_tree() {
            return Err(MocoError::NotARepository {
                path: self.workdir.clone(),
            }
            .into());
        }

        let branch = self.current_branch()?;
        let full_hash = self
            .run_capture(&["rev-parse", "HEAD"])
            .context("resolve HEAD (does the repository have a commit?)")?
            .trim()
            .to_string();
        let changes = self.status_porcelain()?;
        let last_commit = match self.last_commit() {
            Ok(commit) => Some(commit),
            Err(err) => {
                warn!(err = %err, "could not read last commit");
                None
            }
        };

        debug!(branch = %branch, dirty = !changes.is_empty(), "repository status");
        Ok(RepoStatus {
            is_valid: true,
            short_hash: short_hash(&full_hash).to_string(),
            full_hash,
            branch,
            is_dirty: !changes.is_empty(),
            changes,
            last_commit,
        })
    }

    /// Return the current branch name, or [`DETACHED_HEAD`].
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            debug!("detached HEAD detected");
            return Ok(DETACHED_HEAD.to_string());
        }
        Ok(name)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    pub fn last_commit(&self) -> Result<CommitInfo> {
        let out = self.run_capture(&["log", "-1", "--format=%an%x00%aI%x00%B"])?;
        parse_commit_line(&out)
    }

    /// Staged and unstaged changes against HEAD.
    pub fn uncommitted_diff(&self) -> Result<String> {
        let diff = self.run_capture(&["diff", "HEAD"])?;
        if diff.trim().is_empty() {
            return Ok(NO_UNCOMMITTED_CHANGES.to_string());
        }
        Ok(diff)
    }

    /// `git show` of HEAD: message, stats and patch.
    pub fn commit_details(&self) -> Result<String> {
        let details = self.run_capture(&["show", "HEAD"])?;
        if details.trim().is_empty() {
            return Ok(NO_COMMIT_DETAILS.to_string());
        }
        Ok(details)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Human-readable status in the shape of `git status`.
pub fn render_git_status(status: &RepoStatus) -> String {
    if !status.is_valid {
        return "Not a valid git repository".to_string();
    }
    let mut out = format!("On branch {}\n", status.branch);
    if status.changes.is_empty() {
        out.push_str("nothing to commit, working tree clean\n");
        return out;
    }
    out.push_str("Changes:\n");
    for entry in &status.changes {
        out.push_str(&format!("  {} {}\n", entry.code, entry.path));
    }
    out
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

fn parse_commit_line(raw: &str) -> Result<CommitInfo> {
    let mut parts = raw.splitn(3, '\0');
    let (Some(author), Some(date), Some(message)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(anyhow!("unexpected git log output: '{}'", raw.trim()));
    };
    let date = DateTime::parse_from_rfc3339(date.trim())
        .with_context(|| format!("parse commit date '{}'", date.trim()))?;
    Ok(CommitInfo {
        author: author.trim().to_string(),
        message: message.trim().to_string(),
        date,
    })
}
