//! Test-only fixtures: scratch git repositories and run records.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use tempfile::TempDir;

use crate::core::naming::run_dir_name;
use crate::core::types::{RepoStatus, RunRecord};
use crate::io::record::{InitialBlock, RecordDetails, append_results_block, write_initial_block};

/// A committed git repository in a temp directory, on branch `main`, that
/// ignores `runs/` and `archives/`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.name", "Moco Test"])?;
        repo.git(&["config", "user.email", "moco@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write_file(".gitignore", "runs/\narchives/\n")?;
        repo.write_file("README.md", "experiment\n")?;
        repo.git(&["add", "-A"])?;
        repo.git(&["commit", "-q", "-m", "initial commit"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// A valid, clean repository status on `branch`.
pub fn sample_repo_status(branch: &str) -> RepoStatus {
    RepoStatus {
        is_valid: true,
        branch: branch.to_string(),
        short_hash: "0123abc".to_string(),
        full_hash: "0123abcd0123abcd0123abcd0123abcd0123abcd".to_string(),
        is_dirty: false,
        changes: Vec::new(),
        last_commit: None,
    }
}

pub fn sample_details() -> RecordDetails {
    RecordDetails {
        hostname: "lab-host".to_string(),
        commit_details: "commit 0123abcd\n".to_string(),
        git_status: "On branch main\nnothing to commit, working tree clean\n".to_string(),
        diff: "[No uncommitted changes]\n".to_string(),
        system_info: "Linux lab-host".to_string(),
    }
}

/// In-memory record. `exit_status: None` is a running run; exit 130 is marked interrupted.
pub fn finished_run(
    start: DateTime<Utc>,
    branch: &str,
    command: &str,
    exit_status: Option<i32>,
    duration_secs: i64,
) -> RunRecord {
    let name = run_dir_name(&start, branch, "0123abc");
    RunRecord {
        directory: PathBuf::from("runs").join(name),
        command: command.to_string(),
        start_time: start,
        end_time: exit_status.map(|_| start + TimeDelta::seconds(duration_secs)),
        exit_status,
        interrupted: exit_status == Some(130),
        branch: branch.to_string(),
        commit_hash: "0123abcd0123abcd0123abcd0123abcd0123abcd".to_string(),
        hostname: None,
        working_directory: None,
    }
}

/// Write a run directory with its record under `base_dir` and return the directory.
pub fn write_run(
    base_dir: &Path,
    record_file: &str,
    start: DateTime<Utc>,
    branch: &str,
    command: &str,
    exit_status: Option<i32>,
) -> Result<PathBuf> {
    let start = start.fixed_offset();
    let repo = sample_repo_status(branch);
    let dir = base_dir.join(run_dir_name(&start, branch, &repo.short_hash));
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(record_file);
    let command: Vec<String> = command.split(' ').map(str::to_string).collect();
    write_initial_block(
        &path,
        &InitialBlock {
            start_time: start,
            repo: &repo,
            command: &command,
            working_directory: &dir,
            details: &sample_details(),
        },
    )?;
    if let Some(code) = exit_status {
        append_results_block(&path, start, start + TimeDelta::seconds(2), code, code == 130)?;
    }
    Ok(dir)
}
