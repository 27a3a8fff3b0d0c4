//! Compressed archives of run directories, plus the archive index.
//!
//! Archives are written to a temp path and renamed into place, so a failed
//! write never leaves a partial archive behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const ARCHIVE_INDEX_FILE: &str = "archive_index.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    #[value(name = "tar.gz")]
    TarGz,
    #[serde(rename = "zip")]
    #[value(name = "zip")]
    Zip,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

/// Archive `src_dir` into `<dest_dir>/<dir name>.<ext>` and return the archive path.
///
/// Entries are stored under the directory's own name.
#[instrument(skip_all, fields(src = %src_dir.display(), format = format.extension()))]
pub fn write_archive(src_dir: &Path, dest_dir: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let name = src_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot archive {}: no directory name", src_dir.display()))?;
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("create directory {}", dest_dir.display()))?;

    let dest = dest_dir.join(format!("{name}.{}", format.extension()));
    if dest.exists() {
        return Err(anyhow!("archive {} already exists", dest.display()));
    }
    let tmp = dest_dir.join(format!(".{name}.{}.tmp", format.extension()));

    let written = match format {
        ArchiveFormat::TarGz => write_tar_gz(src_dir, &name, &tmp),
        ArchiveFormat::Zip => write_zip(src_dir, &name, &tmp),
    };
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    fs::rename(&tmp, &dest).with_context(|| format!("move archive to {}", dest.display()))?;
    debug!(dest = %dest.display(), "archive written");
    Ok(dest)
}

fn write_tar_gz(src_dir: &Path, root: &str, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(root, src_dir)
        .with_context(|| format!("add {} to tar", src_dir.display()))?;
    let encoder = builder.into_inner().context("finish tar stream")?;
    let mut inner = encoder.finish().context("finish gzip stream")?;
    inner
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

fn write_zip(src_dir: &Path, root: &str, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", src_dir.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .with_context(|| format!("relativize {}", entry.path().display()))?;
        let mut name = root.to_string();
        for component in rel.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .with_context(|| format!("add directory {}", entry.path().display()))?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)
                .with_context(|| format!("add file {}", entry.path().display()))?;
            let mut input = File::open(entry.path())
                .with_context(|| format!("open {}", entry.path().display()))?;
            io::copy(&mut input, &mut zip)
                .with_context(|| format!("compress {}", entry.path().display()))?;
        }
    }

    let mut inner = zip.finish().context("finish zip archive")?;
    inner
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

/// One archived run, as listed in the archive index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub archived_at: DateTime<Local>,
    pub run_name: String,
    pub archive_file: String,
    pub status: String,
    pub command: String,
}

/// Append rows to `<dest_dir>/archive_index.md`, writing the header on first use.
pub fn append_index(dest_dir: &Path, entries: &[IndexEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let path = dest_dir.join(ARCHIVE_INDEX_FILE);
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let mut text = String::new();
    if is_new {
        text.push_str("# Archive Index\n\n");
        text.push_str("| Archived | Run | Archive | Status | Command |\n");
        text.push_str("|---|---|---|---|---|\n");
    }
    for entry in entries {
        text.push_str(&format!(
            "| {} | {} | {} | {} | `{}` |\n",
            entry.archived_at.format("%Y-%m-%d %H:%M:%S"),
            table_cell(&entry.run_name),
            table_cell(&entry.archive_file),
            table_cell(&entry.status),
            table_cell(&entry.command),
        ));
    }
    out.write_all(text.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

fn table_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}
