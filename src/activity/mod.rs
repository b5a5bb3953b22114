// src/activity/mod.rs

//! Unit-of-work layer.
//!
//! - [`work`] defines the `UnitOfWork` boundary and the production
//!   `CorpusActivities` implementation.
//! - [`stress`] is the CPU-load simulation behind `simulate()`.
//! - [`invoker`] runs a single invocation under a start-to-close timeout,
//!   retries retryable failures with exponential backoff, and bounds the
//!   number of concurrent invocations with a shared worker pool.

pub mod invoker;
pub mod stress;
pub mod work;

use std::time::Duration;

use thiserror::Error;

pub use invoker::{Invoker, RetryPolicy, WorkerPool};
pub use work::{CorpusActivities, UnitOfWork};

/// Failure of one unit-of-work invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    #[error("retryable failure: {0}")]
    Retryable(String),

    #[error("non-retryable failure: {0}")]
    NonRetryable(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl ActivityError {
    /// Timeouts count as retryable, the same as explicit retryable failures.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ActivityError::NonRetryable(_))
    }
}
