// src/engine/lineage.rs

//! Chains orchestrator lifetimes together across checkpoint-and-restart.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::activity::Invoker;
use crate::child::ChildLauncher;
use crate::errors::Result;
use crate::source::BatchSource;
use crate::substrate::checkpoint::run_blocking;
use crate::substrate::{CheckpointStore, Continuation, LineageId};
use crate::types::ReconcilePolicy;

use super::children::ChildSet;
use super::core::{CoreLimits, OrchestratorCore};
use super::registry::{StatusHandle, StatusPublisher, StatusSnapshot};
use super::runtime::{LifetimeOutcome, Runtime};
use super::OrchestrationParams;

/// Summary of a lineage that ran to exhaustion.
#[derive(Debug, Clone)]
pub struct LineageReport {
    /// Number of lifetimes, including the final one.
    pub lifetimes: u32,
    /// Parameters the final lifetime started from.
    pub final_params: OrchestrationParams,
    /// Status registry of the final lifetime.
    pub status: StatusSnapshot,
    /// Continuation that started the final lifetime, if this run crossed
    /// at least one checkpoint. Earlier ones are not retained.
    pub last_continuation: Option<Continuation>,
}

/// Runs lifetime after lifetime until the batch source is exhausted.
///
/// Each lifetime gets a fresh core (and so a fresh status registry); only
/// the continuation crosses the boundary, plus the in-flight handles when
/// the reconcile policy is `CarryForward`.
pub struct Lineage<S: BatchSource, L: ChildLauncher> {
    id: LineageId,
    limits: CoreLimits,
    source: Arc<S>,
    launcher: Arc<L>,
    store: Arc<dyn CheckpointStore>,
    fetcher: Invoker,
    publisher: StatusPublisher,
}

impl<S: BatchSource, L: ChildLauncher> fmt::Debug for Lineage<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lineage")
            .field("id", &self.id)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl<S: BatchSource + 'static, L: ChildLauncher + 'static> Lineage<S, L> {
    pub fn new(
        id: LineageId,
        limits: CoreLimits,
        source: Arc<S>,
        launcher: Arc<L>,
        store: Arc<dyn CheckpointStore>,
        fetcher: Invoker,
    ) -> Self {
        let (publisher, _handle) = StatusPublisher::channel();
        Self {
            id,
            limits,
            source,
            launcher,
            store,
            fetcher,
            publisher,
        }
    }

    /// Status query surface. Always reflects the current lifetime.
    pub fn status_handle(&self) -> StatusHandle {
        self.publisher.subscribe()
    }

    /// Parameters to start from: the persisted continuation when `resume` is
    /// set and one exists, `initial` otherwise.
    ///
    /// A resumed continuation's carried identities are dropped: their
    /// completion futures died with the previous process.
    pub fn starting_params(
        &self,
        initial: OrchestrationParams,
        resume: bool,
    ) -> Result<(OrchestrationParams, u32)> {
        if !resume {
            return Ok((initial, 1));
        }

        match self.store.load()? {
            Some(continuation) if continuation.lineage == self.id.as_str() => {
                if !continuation.carried.is_empty() {
                    warn!(
                        carried = continuation.carried.len(),
                        "resuming from checkpoint; carried sub-processes can no longer be tracked"
                    );
                }
                info!(
                    offset = continuation.params.offset,
                    lifetime = continuation.lifetime + 1,
                    "resuming lineage from checkpoint"
                );
                Ok((continuation.params, continuation.lifetime + 1))
            }
            Some(continuation) => {
                warn!(
                    found = %continuation.lineage,
                    expected = %self.id,
                    "checkpoint belongs to another lineage; starting fresh"
                );
                Ok((initial, 1))
            }
            None => Ok((initial, 1)),
        }
    }

    /// Run the lineage from `params` (as lifetime `first_lifetime`) until the
    /// source is exhausted.
    pub async fn run(
        self,
        params: OrchestrationParams,
        first_lifetime: u32,
    ) -> Result<LineageReport> {
        let mut params = params;
        let mut lifetime = first_lifetime;
        let mut inherited = ChildSet::new();
        let mut carried: Vec<String> = Vec::new();
        let mut last_continuation = None;

        loop {
            let core = OrchestratorCore::new(self.id.clone(), params, self.limits)
                .with_lifetime(lifetime)
                .with_carried(carried.drain(..));
            let runtime = Runtime::new(
                core,
                Arc::clone(&self.source),
                Arc::clone(&self.launcher),
                Arc::clone(&self.store),
                self.fetcher.clone(),
                self.publisher.clone(),
            )
            .with_inherited(std::mem::take(&mut inherited));

            match runtime.run().await? {
                LifetimeOutcome::Completed { status } => {
                    run_blocking(&self.store, |store| store.clear()).await?;
                    info!(
                        lineage = %self.id,
                        lifetimes = lifetime - first_lifetime + 1,
                        completed = status.count(super::SubProcessStatus::Completed),
                        failed = status.count(super::SubProcessStatus::Failed),
                        "lineage finished"
                    );
                    return Ok(LineageReport {
                        lifetimes: lifetime - first_lifetime + 1,
                        final_params: params,
                        status,
                        last_continuation,
                    });
                }
                LifetimeOutcome::ContinuedAsNew {
                    continuation,
                    mut in_flight,
                    ..
                } => {
                    match self.limits.reconcile {
                        ReconcilePolicy::Abandon => {
                            if !in_flight.is_empty() {
                                info!(
                                    abandoned = in_flight.len(),
                                    "continuing as new; in-flight sub-processes are untracked"
                                );
                            }
                            in_flight.detach_all();
                        }
                        ReconcilePolicy::CarryForward => {
                            carried = continuation.carried.clone();
                            inherited = in_flight;
                        }
                    }
                    params = continuation.params;
                    lifetime += 1;
                    last_continuation = Some(continuation);
                }
            }
        }
    }
}
