// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable that overrides `[worker].task_queue`.
pub const TASK_QUEUE_ENV: &str = "BATCHWINDOW_TASK_QUEUE";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, apply environment overrides and
/// validate it.
///
/// A missing file is not an error: every section has defaults, so the
/// defaults are validated instead.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw = if path.exists() {
        load_from_path(path)?
    } else {
        debug!(path = %path.display(), "config file not found; using defaults");
        RawConfigFile::default()
    };

    apply_env_overrides(&mut raw);
    ConfigFile::try_from(raw)
}

/// Apply environment overrides on top of the file contents.
pub fn apply_env_overrides(raw: &mut RawConfigFile) {
    if let Ok(queue) = std::env::var(TASK_QUEUE_ENV) {
        if !queue.trim().is_empty() {
            debug!(task_queue = %queue, "task queue overridden from environment");
            raw.worker.task_queue = queue;
        }
    }
}

/// Default config location: `BatchWindow.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("BatchWindow.toml")
}
