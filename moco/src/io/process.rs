//! Child process execution with output tee and interrupt handling.
//!
//! The child's stdout and stderr are copied to the console and to log files
//! as bytes arrive. Completion is raced against a stop future; on a stop
//! signal the signal is forwarded to the child (if it is still alive) and the
//! completion channel is drained before returning, so the child is never
//! orphaned.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::core::error::MocoError;
use crate::exit_codes;

/// Signal that asked the runner to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl StopSignal {
    #[cfg(unix)]
    fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            Self::Interrupt => nix::sys::signal::Signal::SIGINT,
            Self::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

/// Handlers for SIGINT and SIGTERM, registered when constructed.
///
/// Register before spawning the child so a signal that arrives during spawn
/// is not lost.
pub struct StopSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl StopSignals {
    /// Must be called from within a tokio runtime.
    pub fn register() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt()).context("install SIGINT handler")?,
                terminate: signal(SignalKind::terminate()).context("install SIGTERM handler")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    pub async fn recv(mut self) -> StopSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => StopSignal::Interrupt,
                _ = self.terminate.recv() => StopSignal::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            StopSignal::Interrupt
        }
    }
}

/// What to run and where its output goes.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub argv: Vec<String>,
    /// Child working directory; `None` inherits the runner's.
    pub cwd: Option<PathBuf>,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    /// Set when a stop signal arrived before the child finished.
    pub stopped_by: Option<StopSignal>,
}

/// Run the child to completion, teeing output, unless `stop` resolves first.
///
/// Spawn failures are [`MocoError::Spawn`]. A child killed by a signal is
/// reported as exit code 1; a stopped run is reported as
/// [`exit_codes::INTERRUPTED`].
#[instrument(skip_all, fields(program = spec.argv.first().map(String::as_str).unwrap_or("")))]
pub async fn run_teed<F>(spec: &ProcessSpec, stop: F) -> Result<ProcessOutcome>
where
    F: Future<Output = StopSignal>,
{
    let (program, args) = spec
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;

    let stdout_log = create_log(&spec.stdout_log).await?;
    let stderr_log = create_log(&spec.stderr_log).await?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    debug!("spawning child process");
    let mut child = cmd.spawn().map_err(|source| MocoError::Spawn {
        command: spec.argv.join(" "),
        source,
    })?;
    let pid = child.id();
    info!(pid = ?pid, "command started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_task = tokio::spawn(tee(stdout, tokio::io::stdout(), stdout_log, "stdout"));
    let stderr_task = tokio::spawn(tee(stderr, tokio::io::stderr(), stderr_log, "stderr"));

    let (done_tx, mut done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let status = child.wait().await;
        let _ = done_tx.send(status);
    });

    let outcome = tokio::select! {
        status = &mut done_rx => ProcessOutcome {
            exit_code: exit_code(status),
            stopped_by: None,
        },
        signal = stop => {
            warn!(?signal, "stop signal received");
            if let Some(pid) = pid {
                forward_signal(pid, signal);
            }
            // The child may exit on its own even if forwarding failed; either
            // way its status is always collected.
            let status = done_rx.await;
            debug!(exit_code = exit_code(status), "child finished after stop signal");
            ProcessOutcome {
                exit_code: exit_codes::INTERRUPTED,
                stopped_by: Some(signal),
            }
        }
    };

    join_tee(stdout_task).await;
    join_tee(stderr_task).await;
    info!(exit_code = outcome.exit_code, "command finished");
    Ok(outcome)
}

async fn create_log(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::create(path)
        .await
        .with_context(|| format!("create log file {}", path.display()))
}

fn exit_code(status: Result<std::io::Result<ExitStatus>, oneshot::error::RecvError>) -> i32 {
    match status {
        Ok(Ok(status)) => status.code().unwrap_or(1),
        Ok(Err(err)) => {
            error!(err = %err, "failed to wait for child");
            1
        }
        Err(_) => {
            error!("child waiter dropped without a status");
            1
        }
    }
}

/// Copy `reader` to both `console` and `log` until EOF.
///
/// A console write failure (e.g. closed stdout) stops console output but the
/// log keeps receiving bytes.
async fn tee<R, W>(mut reader: R, mut console: W, mut log: tokio::fs::File, label: &'static str) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut total = 0u64;
    let mut console_ok = true;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .with_context(|| format!("read child {label}"))?;
        if n == 0 {
            break;
        }
        if console_ok {
            let written = async {
                console.write_all(&buf[..n]).await?;
                console.flush().await
            };
            if let Err(err) = written.await {
                warn!(err = %err, stream = label, "console write failed; logging only");
                console_ok = false;
            }
        }
        log.write_all(&buf[..n])
            .await
            .with_context(|| format!("write {label} log"))?;
        total += n as u64;
    }
    log.flush()
        .await
        .with_context(|| format!("flush {label} log"))?;
    Ok(total)
}

async fn join_tee(task: JoinHandle<Result<u64>>) {
    match task.await {
        Ok(Ok(bytes)) => debug!(bytes, "output stream closed"),
        Ok(Err(err)) => warn!(err = %format!("{err:#}"), "output capture failed"),
        Err(err) => warn!(err = %err, "output capture task panicked"),
    }
}

/// Forward `signal` to `pid` if it is still alive. Returns whether it was sent.
#[cfg(unix)]
fn forward_signal(pid: u32, signal: StopSignal) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let pid = Pid::from_raw(raw);
    // No signal: existence probe only.
    if let Err(err) = kill(pid, None) {
        debug!(pid = raw, err = %err, "child already exited; not forwarding");
        return false;
    }
    if let Err(err) = kill(pid, signal.as_nix()) {
        error!(pid = raw, err = %err, "failed to forward signal");
        return false;
    }
    info!(pid = raw, ?signal, "forwarded signal to command");
    true
}

/// The console delivers Ctrl-C to the whole process group; nothing to forward.
#[cfg(not(unix))]
fn forward_signal(_pid: u32, _signal: StopSignal) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(dir: &Path, argv: &[&str]) -> ProcessSpec {
        ProcessSpec {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            cwd: Some(dir.to_path_buf()),
            stdout_log: dir.join("stdout.log"),
            stderr_log: dir.join("stderr.log"),
        }
    }

    #[tokio::test]
    async fn tees_both_streams_to_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = spec(temp.path(), &["sh", "-c", "echo out; echo err >&2; exit 3"]);
        let outcome = run_teed(&spec, std::future::pending()).await.expect("run");
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stopped_by, None);
        assert_eq!(std::fs::read_to_string(&spec.stdout_log).unwrap(), "out\n");
        assert_eq!(std::fs::read_to_string(&spec.stderr_log).unwrap(), "err\n");
    }

    #[tokio::test]
    async fn child_runs_in_requested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = spec(temp.path(), &["pwd"]);
        run_teed(&spec, std::future::pending()).await.expect("run");
        let printed = std::fs::read_to_string(&spec.stdout_log).unwrap();
        let printed = std::fs::canonicalize(printed.trim()).unwrap();
        assert_eq!(printed, std::fs::canonicalize(temp.path()).unwrap());
    }

    #[tokio::test]
    async fn stop_signal_interrupts_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = spec(temp.path(), &["sleep", "5"]);
        let started = std::time::Instant::now();
        let stop = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            StopSignal::Interrupt
        };
        let outcome = run_teed(&spec, stop).await.expect("run");
        assert_eq!(outcome.exit_code, exit_codes::INTERRUPTED);
        assert_eq!(outcome.stopped_by, Some(StopSignal::Interrupt));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn forwards_only_to_live_children() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = std::process::Command::new("sleep")
            .arg("5")
            .spawn()
            .expect("spawn sleep");
        assert!(forward_signal(child.id(), StopSignal::Terminate));
        let status = child.wait().expect("wait");
        assert_eq!(status.signal(), Some(nix::sys::signal::Signal::SIGTERM as i32));

        assert!(!forward_signal(child.id(), StopSignal::Interrupt));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = spec(temp.path(), &["moco-no-such-program-xyz"]);
        let err = run_teed(&spec, std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MocoError>(),
            Some(MocoError::Spawn { .. })
        ));
    }
}
