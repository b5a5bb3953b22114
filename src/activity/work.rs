// src/activity/work.rs

use tracing::trace;

use crate::activity::ActivityError;
use crate::activity::stress::stress_cpu;
use crate::types::BoxFuture;

/// The smallest externally executed operation.
///
/// Implementations must be stateless as far as callers can tell and safe to
/// invoke more than once for the same record: the invoker retries.
pub trait UnitOfWork: Send + Sync {
    /// Process a single record.
    fn process(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>>;

    /// Alternative processing path, used by the partitioned fan-out for the
    /// second half of a batch. Defaults to [`UnitOfWork::process`].
    fn process_alt(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        self.process(record)
    }

    /// Simulated background load with no input and no output.
    fn simulate(&self) -> BoxFuture<'_, Result<(), ActivityError>>;
}

/// Production unit of work for corpus records.
#[derive(Debug, Clone)]
pub struct CorpusActivities {
    stress_iterations: u32,
}

impl CorpusActivities {
    pub fn new(stress_iterations: u32) -> Self {
        Self { stress_iterations }
    }
}

impl UnitOfWork for CorpusActivities {
    fn process(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        Box::pin(async move {
            let out = record.to_uppercase();
            trace!(%record, %out, "processed record");
            Ok(out)
        })
    }

    fn process_alt(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        Box::pin(async move {
            let out: String = record.chars().rev().collect();
            trace!(%record, %out, "processed record (alt path)");
            Ok(out)
        })
    }

    fn simulate(&self) -> BoxFuture<'_, Result<(), ActivityError>> {
        let iterations = self.stress_iterations;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || stress_cpu(iterations))
                .await
                .map(|_| ())
                .map_err(|e| ActivityError::Retryable(format!("stress task failed: {e}")))
        })
    }
}
