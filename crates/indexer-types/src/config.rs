//! Configuration loading for the content indexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/content-indexer/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::IndexerError;

/// Characters held in memory before an adaptive buffer spills to disk.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

/// Smallest writer budget Tantivy accepts.
const MIN_WRITER_MEMORY_MB: usize = 15;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding one sub-directory per index ID
    #[serde(default = "default_index_root")]
    pub index_root: String,

    /// Number of scheduler workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Buffer size at which translated content spills to a temporary file
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,

    /// Directory for spill files (system temp dir when unset)
    #[serde(default)]
    pub spill_dir: Option<String>,

    /// Memory budget in MB for each index writer
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Seconds shutdown waits for running jobs
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "content-indexer")
}

fn default_index_root() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("indexes"))
        .unwrap_or_else(|| PathBuf::from("./indexes"))
        .to_string_lossy()
        .to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_spill_threshold() -> usize {
    DEFAULT_SPILL_THRESHOLD
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_root: default_index_root(),
            worker_count: default_worker_count(),
            spill_threshold: default_spill_threshold(),
            spill_dir: None,
            writer_memory_mb: default_writer_memory_mb(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (`<config dir>/content-indexer/config.toml`)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (`INDEXER_WORKER_COUNT`, `INDEXER_INDEX_ROOT`, ...)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, IndexerError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_root", default_index_root())
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .set_default("worker_count", default_worker_count() as i64)
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .set_default("spill_threshold", default_spill_threshold() as i64)
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .set_default("shutdown_timeout_secs", default_shutdown_timeout() as i64)
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Double underscore separates nesting so single underscores stay in field names.
        builder = builder.add_source(
            Environment::with_prefix("INDEXER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| IndexerError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.worker_count == 0 {
            return Err(IndexerError::Config("worker_count must be > 0".to_string()));
        }
        if self.spill_threshold == 0 {
            return Err(IndexerError::Config(
                "spill_threshold must be > 0".to_string(),
            ));
        }
        if self.writer_memory_mb < MIN_WRITER_MEMORY_MB {
            return Err(IndexerError::Config(format!(
                "writer_memory_mb must be >= {}, got {}",
                MIN_WRITER_MEMORY_MB, self.writer_memory_mb
            )));
        }
        Ok(())
    }

    /// Index root with a leading `~/` expanded to the home directory
    pub fn expanded_index_root(&self) -> PathBuf {
        expand_home(&self.index_root)
    }

    /// Spill directory, falling back to the system temp dir
    pub fn spill_dir_path(&self) -> PathBuf {
        self.spill_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
