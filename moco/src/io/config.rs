//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, the user file
//! (`<config dir>/moco/config.toml`), the project file (`.moco.toml`), then
//! environment variables. Command-line flags are applied last by each command
//! when it builds its request. The resolved [`Config`] is immutable and passed
//! by reference.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::age::parse_age;
use crate::core::query::SortKey;
use crate::core::retention::ArchiveStatus;
use crate::io::bundle::ArchiveFormat;
use crate::render::{ListFormat, StatusFormat, StatusLevel};

pub const PROJECT_CONFIG_FILE: &str = ".moco.toml";
pub const BASE_DIR_ENV: &str = "MOCO_PATHS_BASE_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub run: RunConfig,
    pub git: GitConfig,
    pub list: ListConfig,
    pub status: StatusConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding run directories, relative to the working directory.
    pub base_dir: PathBuf,
    /// Record file inside each run directory.
    pub summary_file: String,
    pub stdout_file: String,
    pub stderr_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("runs"),
            summary_file: "summary.md".to_string(),
            stdout_file: "stdout.log".to_string(),
            stderr_file: "stderr.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Run even when the working tree is dirty.
    pub force: bool,
    /// Delete the run directory when the command exits non-zero.
    pub cleanup_on_fail: bool,
    /// Keep the child in the invoking directory instead of the run directory.
    pub no_pushd: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    pub require_clean: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            require_clean: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ListConfig {
    pub format: ListFormat,
    pub sort_by: SortKey,
    pub reverse: bool,
    /// Zero means unlimited.
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    pub level: StatusLevel,
    pub format: StatusFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub format: ArchiveFormat,
    /// Age spec (`30d`, `12h`, `45m`); empty disables the age filter.
    pub older_than: String,
    pub status: ArchiveStatus,
    /// Destination directory for archives and the archive index.
    pub to: PathBuf,
    pub delete: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::TarGz,
            older_than: "30d".to_string(),
            status: ArchiveStatus::All,
            to: PathBuf::from("archives"),
            delete: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.paths.base_dir.as_os_str().is_empty() {
            return Err(anyhow!("paths.base_dir must not be empty"));
        }
        let files = [
            ("paths.summary_file", &self.paths.summary_file),
            ("paths.stdout_file", &self.paths.stdout_file),
            ("paths.stderr_file", &self.paths.stderr_file),
        ];
        for (key, name) in files {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(anyhow!("{key} must be a plain, non-empty file name"));
            }
        }
        if self.paths.summary_file == self.paths.stdout_file
            || self.paths.summary_file == self.paths.stderr_file
            || self.paths.stdout_file == self.paths.stderr_file
        {
            return Err(anyhow!("paths.summary_file, stdout_file and stderr_file must differ"));
        }
        if !self.archive.older_than.trim().is_empty() {
            parse_age(&self.archive.older_than).context("archive.older_than")?;
        }
        if self.archive.to.as_os_str().is_empty() {
            return Err(anyhow!("archive.to must not be empty"));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config toml")
    }
}

/// Resolve the effective configuration for `project_dir`.
pub fn load_config(project_dir: &Path) -> Result<Config> {
    let user = dirs::config_dir().map(|dir| dir.join("moco").join("config.toml"));
    load_layered(
        user.as_deref(),
        &project_dir.join(PROJECT_CONFIG_FILE),
        std::env::var(BASE_DIR_ENV).ok(),
    )
}

/// Merge the given layers over the defaults. Missing files are skipped.
pub fn load_layered(
    user_file: Option<&Path>,
    project_file: &Path,
    base_dir_env: Option<String>,
) -> Result<Config> {
    let mut merged = to_table(&Config::default())?;
    for path in user_file.into_iter().chain([project_file]) {
        if let Some(layer) = read_layer(path)? {
            debug!(path = %path.display(), "applying config layer");
            merge_tables(&mut merged, layer);
        }
    }

    let rendered = toml::to_string(&merged).context("serialize merged config")?;
    let mut cfg: Config = toml::from_str(&rendered).context("parse merged config")?;

    if let Some(base_dir) = base_dir_env.filter(|value| !value.trim().is_empty()) {
        debug!(base_dir = %base_dir, "base dir from {BASE_DIR_ENV}");
        cfg.paths.base_dir = PathBuf::from(base_dir);
    }

    cfg.validate()?;
    Ok(cfg)
}

fn read_layer(path: &Path) -> Result<Option<toml::Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    // Type errors and unknown keys should name the file they came from.
    toml::from_str::<Config>(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(table))
}

fn to_table(cfg: &Config) -> Result<toml::Table> {
    let rendered = toml::to_string(cfg).context("serialize config toml")?;
    toml::from_str(&rendered).context("parse config toml")
}

/// Recursively overlay `layer` onto `base`; scalar values in `layer` win.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
