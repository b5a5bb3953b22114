// src/config/mod.rs

//! Configuration loading and validation for batchwindow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply env overrides (`loader.rs`).
//! - Validate sizes, thresholds and retry settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ActivitySection, ChildSection, ConfigFile, OrchestratorSection, RawConfigFile, SourceSection,
    WorkerSection,
};
pub use validate::validate_config;
