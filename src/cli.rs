// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::FanOutPolicy;

/// Command-line arguments for `batchwindow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchwindow",
    version,
    about = "Process a record source in batches through a bounded window of sub-processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Port for the status query surface.
    ///
    /// Overrides `[worker].metrics_port` (default 8087).
    #[arg(value_name = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Path to the config file (TOML).
    ///
    /// Default: `BatchWindow.toml` in the current working directory. A
    /// missing file means all defaults.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Record offset to start paging from.
    #[arg(long, value_name = "N")]
    pub offset: Option<u64>,

    /// Total number of records to page through.
    #[arg(long, value_name = "N")]
    pub total_records: Option<u64>,

    /// Fan-out policy for every sub-process (uniform, partitioned, paired).
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<FanOutPolicy>,

    /// Continue the lineage from the persisted checkpoint, if there is one.
    ///
    /// Only meaningful with `[orchestrator].checkpoint_path` set.
    #[arg(long)]
    pub resume: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHWINDOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved config, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
