// src/child/mod.rs

//! Sub-process controller.
//!
//! One sub-process handles exactly one batch: it fans the batch out into
//! unit-of-work invocations according to a [`FanOutPolicy`], waits for all of
//! them, and applies the batch-level completion policy.
//!
//! - [`controller`] holds `BatchController` and the three fan-out variants.
//! - [`launcher`] provides the `ChildLauncher` trait the orchestrator starts
//!   sub-processes through, and the production `ControllerLauncher`.
//!
//! [`FanOutPolicy`]: crate::types::FanOutPolicy

pub mod controller;
pub mod launcher;

use thiserror::Error;

use crate::activity::ActivityError;

pub use controller::BatchController;
pub use launcher::{ChildLauncher, ControllerLauncher};

/// Why a sub-process ended up `FAILED`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChildError {
    /// Post-condition veto: every item succeeded, the batch fails anyway.
    /// Never retried.
    #[error("batch {child_id} vetoed (roll {roll})")]
    Vetoed { child_id: String, roll: u32 },

    /// A unit-of-work invocation failed permanently.
    #[error("record '{record}' failed: {source}")]
    ItemFailed {
        record: String,
        #[source]
        source: ActivityError,
    },

    #[error("sub-process panicked: {0}")]
    Panicked(String),
}
