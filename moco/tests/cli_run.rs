//! CLI tests for `moco run`.
//!
//! Spawns the moco binary inside scratch git repositories and checks exit
//! codes and the records left behind.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use moco::core::age::format_duration;
use moco::exit_codes;
use moco::io::discovery::run_dirs;
use moco::io::record::parse_record;
use moco::test_support::TestRepo;

fn moco(dir: &Path, config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_moco"));
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("MOCO_PATHS_BASE_DIR")
        .env("RUST_LOG", "warn");
    cmd
}

fn only_run(repo: &TestRepo) -> PathBuf {
    let dirs = run_dirs(&repo.path().join("runs")).expect("run dirs");
    assert_eq!(dirs.len(), 1, "expected exactly one run: {dirs:?}");
    dirs.into_iter().next().expect("one run")
}

#[test]
fn successful_command_exits_zero_and_records_duration() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");

    let status = moco(repo.path(), config_home.path())
        .args(["run", "sleep", "1"])
        .status()
        .expect("moco run");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let record = parse_record(&only_run(&repo).join("summary.md")).expect("parse");
    assert_eq!(record.exit_status, Some(0));
    assert!(!record.interrupted);
    assert_eq!(format_duration(record.duration(chrono::Utc::now())), "1s");
}

#[test]
fn failing_command_propagates_exit_code() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");

    let output = moco(repo.path(), config_home.path())
        .args(["run", "--", "sh", "-c", "echo to-stdout; exit 3"])
        .output()
        .expect("moco run");
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "to-stdout\n");

    let run = only_run(&repo);
    assert_eq!(
        std::fs::read_to_string(run.join("stdout.log")).expect("log"),
        "to-stdout\n"
    );
    let record = parse_record(&run.join("summary.md")).expect("parse");
    assert_eq!(record.exit_status, Some(3));
    assert_eq!(record.command, "sh -c echo to-stdout; exit 3");
}

#[test]
fn dirty_repository_is_refused() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");
    repo.write_file("README.md", "edited\n").expect("write");

    let output = moco(repo.path(), config_home.path())
        .args(["run", "true"])
        .output()
        .expect("moco run");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("uncommitted changes"));
    assert!(!repo.path().join("runs").exists());

    let status = moco(repo.path(), config_home.path())
        .args(["run", "--force", "true"])
        .status()
        .expect("moco run --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn project_config_sets_base_dir() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");
    repo.write_file(".moco.toml", "[paths]\nbase_dir = \"runs/nested\"\n")
        .expect("write");
    repo.git(&["add", ".moco.toml"]).expect("add");
    repo.git(&["commit", "-q", "-m", "configure moco"]).expect("commit");

    let status = moco(repo.path(), config_home.path())
        .args(["run", "true"])
        .status()
        .expect("moco run");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(run_dirs(&repo.path().join("runs/nested")).expect("dirs").len(), 1);
}

#[cfg(unix)]
#[test]
fn sigint_is_forwarded_and_recorded() {
    let repo = TestRepo::new().expect("repo");
    let config_home = tempfile::tempdir().expect("tempdir");

    let mut child = moco(repo.path(), config_home.path())
        .args(["run", "sleep", "5"])
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn moco");
    let started = Instant::now();

    // Wait until the record exists, i.e. the command has been launched.
    let deadline = started + Duration::from_secs(4);
    while run_dirs(&repo.path().join("runs")).map(|d| d.is_empty()).unwrap_or(true) {
        assert!(Instant::now() < deadline, "run directory never appeared");
        thread::sleep(Duration::from_millis(50));
    }
    thread::sleep(Duration::from_millis(300));

    let kill = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill");
    assert!(kill.success());

    let status = child.wait().expect("wait moco");
    assert_eq!(status.code(), Some(exit_codes::INTERRUPTED));
    assert!(started.elapsed() < Duration::from_secs(5));

    let record = parse_record(&only_run(&repo).join("summary.md")).expect("parse");
    assert_eq!(record.exit_status, Some(130));
    assert!(record.interrupted);
}
