//! `moco run`: execute one command inside a fresh run directory.
//!
//! Lifecycle: read repository status and enforce the clean-tree policy,
//! create the run directory, write the initial record block, run the child
//! (teeing output, racing completion against a stop signal), append the
//! results block, and optionally remove the directory of a failed run.

use std::fs;
use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::core::error::MocoError;
use crate::core::naming::run_dir_name;
use crate::exit_codes;
use crate::io::config::Config;
use crate::io::git::Git;
use crate::io::process::{ProcessSpec, StopSignal, run_teed};
use crate::io::record::{InitialBlock, RecordDetails, append_results_block, write_initial_block};

/// Effective settings for one run: config defaults with command-line flags applied.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: Vec<String>,
    /// Repository working directory; the base dir is resolved against it.
    pub workdir: PathBuf,
    pub force: bool,
    pub cleanup_on_fail: bool,
    pub no_pushd: bool,
}

impl RunRequest {
    pub fn new(cfg: &Config, command: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            force: cfg.run.force,
            cleanup_on_fail: cfg.run.cleanup_on_fail,
            no_pushd: cfg.run.no_pushd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub exit_code: i32,
    pub interrupted: bool,
    /// The run directory was removed because the command failed.
    pub cleaned_up: bool,
}

impl RunOutcome {
    /// Turn a non-zero exit into [`MocoError::CommandFailed`].
    pub fn into_result(self) -> Result<Self> {
        if self.exit_code != exit_codes::OK {
            return Err(MocoError::CommandFailed {
                code: self.exit_code,
            }
            .into());
        }
        Ok(self)
    }
}

/// Run `request.command` to completion (or until `stop` resolves).
///
/// A dirty working tree is refused unless `force` is set or the config does
/// not require a clean tree. Once the child has started, the results block is
/// always appended, whatever the exit status.
#[instrument(skip_all, fields(command = %request.command.join(" ")))]
pub async fn run_experiment<F>(cfg: &Config, request: &RunRequest, stop: F) -> Result<RunOutcome>
where
    F: Future<Output = StopSignal>,
{
    if request.command.is_empty() {
        bail!("no command given");
    }

    let git = Git::new(&request.workdir);
    let repo = git.repository_status()?;
    if repo.is_dirty {
        if cfg.git.require_clean && !request.force {
            return Err(MocoError::DirtyRepository.into());
        }
        warn!(changes = repo.changes.len(), "running with uncommitted changes");
    }

    let details = RecordDetails::gather(&git, &repo);

    let start = Local::now().fixed_offset();
    let base_dir = request.workdir.join(&cfg.paths.base_dir);
    fs::create_dir_all(&base_dir)
        .with_context(|| format!("create base directory {}", base_dir.display()))?;
    let run_dir = base_dir.join(run_dir_name(&start, &repo.branch, &repo.short_hash));
    fs::create_dir(&run_dir)
        .with_context(|| format!("create run directory {}", run_dir.display()))?;
    info!(run_dir = %run_dir.display(), "created run directory");

    let record = run_dir.join(&cfg.paths.summary_file);
    write_initial_block(
        &record,
        &InitialBlock {
            start_time: start,
            repo: &repo,
            command: &request.command,
            working_directory: &run_dir,
            details: &details,
        },
    )?;

    let spec = ProcessSpec {
        argv: request.command.clone(),
        cwd: Some(if request.no_pushd {
            request.workdir.clone()
        } else {
            run_dir.clone()
        }),
        stdout_log: run_dir.join(&cfg.paths.stdout_file),
        stderr_log: run_dir.join(&cfg.paths.stderr_file),
    };
    let process = match run_teed(&spec, stop).await {
        Ok(process) => process,
        Err(err) => {
            // Nothing ran, so the directory holds no results worth keeping.
            if let Err(rm_err) = fs::remove_dir_all(&run_dir) {
                warn!(err = %rm_err, run_dir = %run_dir.display(), "could not remove run directory");
            }
            return Err(err);
        }
    };

    let end = Local::now().fixed_offset();
    let interrupted = process.stopped_by.is_some();
    append_results_block(&record, start, end, process.exit_code, interrupted)?;

    let mut cleaned_up = false;
    if process.exit_code != exit_codes::OK && request.cleanup_on_fail {
        fs::remove_dir_all(&run_dir)
            .with_context(|| format!("remove failed run {}", run_dir.display()))?;
        info!(run_dir = %run_dir.display(), "removed failed run");
        cleaned_up = true;
    }

    Ok(RunOutcome {
        run_dir,
        exit_code: process.exit_code,
        interrupted,
        cleaned_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::age::format_duration;
    use crate::io::record::parse_record;
    use crate::test_support::TestRepo;
    use std::time::Duration;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn successful_run_records_results() {
        let repo = TestRepo::new().expect("repo");
        let cfg = Config::default();
        let request = RunRequest::new(&cfg, argv(&["sleep", "1"]), repo.path());

        let outcome = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("run");
        assert_eq!(outcome.exit_code, 0);
        assert!(!outcome.interrupted);
        assert!(outcome.run_dir.starts_with(repo.path().join("runs")));
        assert!(outcome.run_dir.join("stdout.log").exists());
        assert!(outcome.run_dir.join("stderr.log").exists());

        let record = parse_record(&outcome.run_dir.join("summary.md")).expect("parse");
        assert_eq!(record.exit_status, Some(0));
        assert_eq!(record.command, "sleep 1");
        assert_eq!(record.branch, "main");
        assert!(!record.interrupted);
        assert_eq!(format_duration(record.duration(chrono::Utc::now())), "1s");
        assert!(outcome.into_result().is_ok());
    }

    #[tokio::test]
    async fn stop_signal_records_interruption() {
        let repo = TestRepo::new().expect("repo");
        let cfg = Config::default();
        let request = RunRequest::new(&cfg, argv(&["sleep", "5"]), repo.path());
        let stop = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            StopSignal::Interrupt
        };

        let outcome = run_experiment(&cfg, &request, stop).await.expect("run");
        assert_eq!(outcome.exit_code, exit_codes::INTERRUPTED);
        assert!(outcome.interrupted);

        let record = parse_record(&outcome.run_dir.join("summary.md")).expect("parse");
        assert_eq!(record.exit_status, Some(130));
        assert!(record.interrupted);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MocoError>(),
            Some(MocoError::CommandFailed { code: 130 })
        ));
    }

    #[tokio::test]
    async fn dirty_tree_is_refused_unless_forced() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("scratch.py", "print(1)\n").expect("write");
        let cfg = Config::default();
        let mut request = RunRequest::new(&cfg, argv(&["true"]), repo.path());

        let err = run_experiment(&cfg, &request, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MocoError>(),
            Some(MocoError::DirtyRepository)
        ));
        assert!(!repo.path().join("runs").exists());

        request.force = true;
        let outcome = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("forced run");
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn clean_tree_not_required_when_configured() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("scratch.py", "print(1)\n").expect("write");
        let mut cfg = Config::default();
        cfg.git.require_clean = false;
        let request = RunRequest::new(&cfg, argv(&["true"]), repo.path());
        let outcome = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("run");
        let record = parse_record(&outcome.run_dir.join("summary.md")).expect("parse");
        assert_eq!(record.exit_status, Some(0));
    }

    #[tokio::test]
    async fn failed_run_is_kept_or_cleaned_up() {
        let repo = TestRepo::new().expect("repo");
        let cfg = Config::default();
        let mut request = RunRequest::new(&cfg, argv(&["sh", "-c", "echo boom >&2; exit 4"]), repo.path());

        let kept = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("run");
        assert_eq!(kept.exit_code, 4);
        assert!(!kept.cleaned_up);
        assert_eq!(
            fs::read_to_string(kept.run_dir.join("stderr.log")).expect("stderr"),
            "boom\n"
        );
        let record = parse_record(&kept.run_dir.join("summary.md")).expect("parse");
        assert_eq!(record.exit_status, Some(4));

        // Run directory names have millisecond resolution.
        tokio::time::sleep(Duration::from_millis(5)).await;
        request.cleanup_on_fail = true;
        let cleaned = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("run");
        assert!(cleaned.cleaned_up);
        assert!(!cleaned.run_dir.exists());
    }

    #[tokio::test]
    async fn child_runs_inside_run_directory_by_default() {
        let repo = TestRepo::new().expect("repo");
        let cfg = Config::default();
        let request = RunRequest::new(&cfg, argv(&["sh", "-c", "echo hi > artifact.txt"]), repo.path());
        let outcome = run_experiment(&cfg, &request, std::future::pending())
            .await
            .expect("run");
        assert!(outcome.run_dir.join("artifact.txt").exists());
    }

    #[tokio::test]
    async fn spawn_failure_removes_run_directory() {
        let repo = TestRepo::new().expect("repo");
        let cfg = Config::default();
        let request = RunRequest::new(&cfg, argv(&["moco-no-such-program-xyz"]), repo.path());
        let err = run_experiment(&cfg, &request, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MocoError>(),
            Some(MocoError::Spawn { .. })
        ));
        let leftover = fs::read_dir(repo.path().join("runs")).expect("runs").count();
        assert_eq!(leftover, 0);
    }
}
