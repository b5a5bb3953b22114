// src/engine/mod.rs

//! Orchestration engine for batchwindow.
//!
//! This module ties together:
//! - paging through the batch source
//! - the admission window over in-flight sub-processes
//! - the status registry and its snapshot reads
//! - checkpoint-and-restart (continue-as-new) across lifetimes
//!
//! The pure core state machine lives in [`core`] (with its event handlers in
//! [`handlers`]); the async/IO shell for one lifetime is [`runtime`], and
//! [`lineage`] chains lifetimes together.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::Batch;

/// Input to one orchestrator lifetime. Only `offset` changes from one
/// lifetime to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationParams {
    pub offset: u64,
    pub batch_size: u64,
    pub total_records: u64,
}

/// Last known status of a sub-process.
///
/// `Running` may only move to `Completed` or `Failed`; terminal states never
/// change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubProcessStatus {
    Running,
    Completed,
    Failed,
}

impl SubProcessStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubProcessStatus::Running)
    }
}

impl fmt::Display for SubProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubProcessStatus::Running => "RUNNING",
            SubProcessStatus::Completed => "COMPLETED",
            SubProcessStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// How a sub-process ended, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOutcome {
    Completed,
    Failed(String),
}

/// One resolved sub-process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub child_id: String,
    pub outcome: ChildOutcome,
}

/// Where the core is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pulling batches and launching sub-processes.
    Paging,
    /// Source exhausted; waiting for the window to empty.
    Draining,
    /// Launch threshold reached; waiting for the continuation to persist.
    Checkpointing,
    /// Lifetime over.
    Done,
}

/// Events flowing into the core from the IO shell.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The lifetime begins.
    Started,
    /// Answer to `FetchBatch`.
    BatchFetched(Batch),
    /// Answer to `AwaitAny` / `AwaitAll`: at least one sub-process resolved.
    ChildrenCompleted(Vec<Completion>),
    /// Answer to `Checkpoint`.
    CheckpointPersisted,
}

pub mod children;
pub mod core;
pub mod handlers;
pub mod lineage;
pub mod registry;
pub mod runtime;

pub use children::ChildSet;
pub use self::core::{CoreLimits, OrchestratorCore};
pub use handlers::{CoreCommand, CoreStep};
pub use lineage::{Lineage, LineageReport};
pub use registry::{StatusHandle, StatusPublisher, StatusRegistry, StatusSnapshot};
pub use runtime::{LifetimeOutcome, Runtime};
