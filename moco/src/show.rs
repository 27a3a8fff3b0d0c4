//! `moco show`: print one run's record, through a pager when interactive.

use std::fs;
use std::io::{ErrorKind, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::core::types::RunRecord;
use crate::io::record::parse_record;

const DEFAULT_PAGER: &str = "less -R -F -X";

/// Locate the record for `target`: a record file, a run directory, or a run
/// directory name under `base_dir`.
pub fn resolve_record(target: &Path, base_dir: &Path, record_file: &str) -> Result<PathBuf> {
    let candidates = [target.to_path_buf(), base_dir.join(target)];
    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
        if candidate.is_dir() {
            return Ok(candidate.join(record_file));
        }
    }
    Err(anyhow!("run not found: {}", target.display()))
}

/// Parse the record (parse errors are fatal) and return it with its raw text.
pub fn load_record(path: &Path) -> Result<(RunRecord, String)> {
    let record = parse_record(path)?;
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok((record, text))
}

/// Write `text` to stdout, via `$PAGER` when stdout is a terminal.
pub fn page(text: &str, use_pager: bool) -> Result<()> {
    if use_pager && std::io::stdout().is_terminal() {
        let pager = std::env::var("PAGER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAGER.to_string());
        match spawn_pager(&pager, text) {
            Ok(()) => return Ok(()),
            Err(err) => warn!(pager = %pager, err = %format!("{err:#}"), "pager failed; printing directly"),
        }
    }
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes()).context("write stdout")?;
    stdout.flush().context("flush stdout")
}

fn spawn_pager(pager: &str, text: &str) -> Result<()> {
    let mut parts = pager.split_whitespace();
    let program = parts.next().ok_or_else(|| anyhow!("empty pager command"))?;
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn pager {program}"))?;
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(text.as_bytes()) {
            Ok(()) => {}
            // The user quit the pager before reading everything.
            Err(err) if err.kind() == ErrorKind::BrokenPipe => debug!("pager closed early"),
            Err(err) => return Err(err).context("write to pager"),
        }
    }
    child.wait().context("wait for pager")?;
    Ok(())
}
