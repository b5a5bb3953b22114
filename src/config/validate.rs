// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BatchWindowError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BatchWindowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run all semantic checks on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_orchestrator(cfg)?;
    validate_child(cfg)?;
    validate_activity(cfg)?;
    validate_worker(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> BatchWindowError {
    BatchWindowError::ConfigError(msg.into())
}

fn validate_orchestrator(cfg: &RawConfigFile) -> Result<()> {
    let o = &cfg.orchestrator;

    if o.workflow_id.trim().is_empty() {
        return Err(config_error("[orchestrator].workflow_id must not be empty"));
    }
    if o.batch_size == 0 {
        return Err(config_error("[orchestrator].batch_size must be >= 1 (got 0)"));
    }
    if o.window_size == 0 {
        return Err(config_error("[orchestrator].window_size must be >= 1 (got 0)"));
    }
    if o.continue_as_new_threshold == 0 {
        return Err(config_error(
            "[orchestrator].continue_as_new_threshold must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_child(cfg: &RawConfigFile) -> Result<()> {
    if cfg.child.veto_threshold > 100 {
        return Err(config_error(format!(
            "[child].veto_threshold must be in 0..=100 (got {})",
            cfg.child.veto_threshold
        )));
    }
    Ok(())
}

fn validate_activity(cfg: &RawConfigFile) -> Result<()> {
    let a = &cfg.activity;

    if a.max_attempts == 0 {
        return Err(config_error("[activity].max_attempts must be >= 1 (got 0)"));
    }
    if a.start_to_close_timeout_secs == 0 || a.cpu_start_to_close_timeout_secs == 0 {
        return Err(config_error("[activity] timeouts must be >= 1 second"));
    }
    if a.backoff_coefficient.is_nan() || a.backoff_coefficient < 1.0 {
        return Err(config_error(format!(
            "[activity].backoff_coefficient must be >= 1.0 (got {})",
            a.backoff_coefficient
        )));
    }
    Ok(())
}

fn validate_worker(cfg: &RawConfigFile) -> Result<()> {
    if cfg.worker.task_queue.trim().is_empty() {
        return Err(config_error("[worker].task_queue must not be empty"));
    }
    if cfg.worker.max_concurrent_activities == 0 {
        return Err(config_error(
            "[worker].max_concurrent_activities must be >= 1 (got 0)",
        ));
    }
    Ok(())
}
