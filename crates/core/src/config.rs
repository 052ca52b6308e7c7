//! Where gentask keeps its SQLite file.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use tracing::debug;

pub const DATA_DIR_ENV: &str = "GENTASK_DATA_DIR";
const DB_FILE: &str = "gentask.sqlite3";

/// Which rule picked the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirSource {
    Flag,
    Environment,
    Platform,
    Home,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    source: DataDirSource,
}

impl AppConfig {
    /// Resolves the data directory (`--data-dir`, then `GENTASK_DATA_DIR`, then
    /// the platform data dir, then `~/.gentask`) and makes sure it exists.
    pub fn discover(flag: Option<PathBuf>) -> Result<Self> {
        let env_dir = env::var_os(DATA_DIR_ENV);
        let (data_dir, source) = choose_data_dir(flag, env_dir.as_deref())?;
        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory at {}", data_dir.display())
        })?;
        debug!(path = %data_dir.display(), ?source, "resolved data directory");
        Ok(Self { data_dir, source })
    }

    /// Uses `data_dir` as given, without touching the filesystem.
    pub fn from_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            source: DataDirSource::Flag,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn source(&self) -> DataDirSource {
        self.source
    }
}

fn choose_data_dir(
    flag: Option<PathBuf>,
    env_dir: Option<&OsStr>,
) -> Result<(PathBuf, DataDirSource)> {
    if let Some(dir) = flag {
        return Ok((dir, DataDirSource::Flag));
    }
    if let Some(dir) = env_dir.filter(|dir| !dir.to_string_lossy().trim().is_empty()) {
        return Ok((PathBuf::from(dir), DataDirSource::Environment));
    }
    if let Some(project) = ProjectDirs::from("app", "gentask", "gentask") {
        return Ok((project.data_dir().to_path_buf(), DataDirSource::Platform));
    }
    BaseDirs::new()
        .map(|base| (base.home_dir().join(".gentask"), DataDirSource::Home))
        .ok_or_else(|| {
            anyhow!("No home directory found; pass --data-dir or set {DATA_DIR_ENV}")
        })
}
