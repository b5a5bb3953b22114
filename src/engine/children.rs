// src/engine/children.rs

//! In-flight sub-process handles.

use tokio::task::JoinSet;
use tracing::debug;

use crate::child::ChildError;
use crate::engine::{ChildOutcome, Completion};
use crate::types::BoxFuture;

/// Completion futures of the sub-processes a lifetime is waiting on.
///
/// Each sub-process runs on its own Tokio task; this set only holds a thin
/// watcher per sub-process that reports its identity with the outcome, so a
/// panicking sub-process still resolves as `Failed` under the right id.
#[derive(Debug, Default)]
pub struct ChildSet {
    watchers: JoinSet<Completion>,
}

impl ChildSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn spawn(&mut self, child_id: String, child: BoxFuture<'static, Result<(), ChildError>>) {
        let handle = tokio::spawn(child);
        self.watchers.spawn(async move {
            let outcome = match handle.await {
                Ok(Ok(())) => ChildOutcome::Completed,
                Ok(Err(err)) => ChildOutcome::Failed(err.to_string()),
                Err(join_err) => {
                    ChildOutcome::Failed(ChildError::Panicked(join_err.to_string()).to_string())
                }
            };
            Completion { child_id, outcome }
        });
    }

    /// Wait until at least one sub-process resolves, then collect every other
    /// one that has already resolved too.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn join_any(&mut self) -> Option<Vec<Completion>> {
        let first = loop {
            match self.watchers.join_next().await? {
                Ok(completion) => break completion,
                // Watchers never panic; only abort can end one early.
                Err(e) => debug!(error = %e, "sub-process watcher ended without a result"),
            }
        };

        let mut completions = vec![first];
        while let Some(joined) = self.watchers.try_join_next() {
            if let Ok(completion) = joined {
                completions.push(completion);
            }
        }
        Some(completions)
    }

    /// Stop watching. The sub-processes themselves keep running.
    pub fn detach_all(&mut self) {
        self.watchers.detach_all();
    }
}
