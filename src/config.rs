//! Runtime configuration
//!
//! Everything lives under one data directory (`$GSTBOOK_HOME`, else
//! `~/.gstbook`). An optional `config.toml` there can move the database and
//! the output directory; `GSTBOOK_DB` and `GSTBOOK_OUTPUT_DIR` override both.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::importers::ReaderOptions;

pub const CONFIG_FILE: &str = "config.toml";

/// Optional settings read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub header_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    /// Where accepted uploads are copied to
    pub uploads_dir: PathBuf,
    /// Title rows above the header row in every export sheet
    pub header_rows: usize,
}

/// `$GSTBOOK_HOME`, else `$HOME/.gstbook`, else the platform data directory
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("GSTBOOK_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home).join(".gstbook"));
    }
    dir_spec::data_home()
        .map(|d| d.join("gstbook"))
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

impl Config {
    /// Defaults rooted at `data_dir`, without reading any file or variable
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Config {
            db_path: data_dir.join("data.db"),
            output_dir: data_dir.join("outputs"),
            uploads_dir: data_dir.join("uploads"),
            header_rows: ReaderOptions::default().header_rows,
            data_dir,
        }
    }

    /// Load from the default data directory and the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(default_data_dir()?)
    }

    pub fn load_from(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let file = read_file_config(&data_dir.join(CONFIG_FILE))?;
        let env_db = std::env::var_os("GSTBOOK_DB").map(PathBuf::from);
        let env_output = std::env::var_os("GSTBOOK_OUTPUT_DIR").map(PathBuf::from);
        Ok(Self::resolve(data_dir, file, env_db, env_output))
    }

    /// Layer file settings and then environment overrides over the defaults.
    /// Relative paths in the file are taken relative to the data directory.
    pub fn resolve(
        data_dir: PathBuf,
        file: FileConfig,
        env_db: Option<PathBuf>,
        env_output: Option<PathBuf>,
    ) -> Self {
        let mut config = Config::with_data_dir(&data_dir);
        let anchored = |p: PathBuf| if p.is_relative() { data_dir.join(p) } else { p };

        if let Some(db) = file.db_path {
            config.db_path = anchored(db);
        }
        if let Some(out) = file.output_dir {
            config.output_dir = anchored(out);
        }
        if let Some(rows) = file.header_rows {
            config.header_rows = rows;
        }
        if let Some(db) = env_db.filter(|p| !p.as_os_str().is_empty()) {
            config.db_path = db;
        }
        if let Some(out) = env_output.filter(|p| !p.as_os_str().is_empty()) {
            config.output_dir = out;
        }
        config
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            header_rows: self.header_rows,
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: FileConfig =
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))?;
    debug!("Loaded {}", path.display());
    Ok(file)
}
