// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::activity::Invoker;
use crate::child::ChildLauncher;
use crate::errors::{BatchWindowError, Result};
use crate::source::{Batch, BatchSource};
use crate::substrate::checkpoint::run_blocking;
use crate::substrate::{CheckpointStore, Continuation};

use super::children::ChildSet;
use super::core::OrchestratorCore;
use super::registry::{StatusPublisher, StatusSnapshot};
use super::{CoreCommand, CoreEvent};

/// How a lifetime ended.
#[derive(Debug)]
pub enum LifetimeOutcome {
    /// Source exhausted and every tracked sub-process resolved.
    Completed { status: StatusSnapshot },
    /// Launch threshold reached; the continuation has been persisted.
    /// `in_flight` still holds the sub-processes this lifetime never waited
    /// for.
    ContinuedAsNew {
        continuation: Continuation,
        status: StatusSnapshot,
        in_flight: ChildSet,
    },
}

/// Drives one lifetime of the orchestrator core, performing the IO its
/// commands ask for: fetching batches, starting and awaiting sub-processes,
/// persisting the continuation.
///
/// All state decisions live in `OrchestratorCore`; this struct only does
/// async IO and publishes a status snapshot after every step.
pub struct Runtime<S: BatchSource, L: ChildLauncher> {
    core: OrchestratorCore,
    source: Arc<S>,
    launcher: Arc<L>,
    store: Arc<dyn CheckpointStore>,
    fetcher: Invoker,
    publisher: StatusPublisher,
    children: ChildSet,
    published_version: Option<u64>,
}

impl<S: BatchSource, L: ChildLauncher> fmt::Debug for Runtime<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

impl<S: BatchSource + 'static, L: ChildLauncher + 'static> Runtime<S, L> {
    pub fn new(
        core: OrchestratorCore,
        source: Arc<S>,
        launcher: Arc<L>,
        store: Arc<dyn CheckpointStore>,
        fetcher: Invoker,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            core,
            source,
            launcher,
            store,
            fetcher,
            publisher,
            children: ChildSet::new(),
            published_version: None,
        }
    }

    /// Hand over sub-processes inherited from the previous lifetime. The core
    /// must have been built `with_carried` the same identities.
    pub fn with_inherited(mut self, children: ChildSet) -> Self {
        self.children = children;
        self
    }

    /// Main loop.
    ///
    /// - Feeds events into the core.
    /// - Executes the commands it returns.
    /// - Stops when the core says `Finish`.
    ///
    /// Errors only on an unrecoverable substrate or source failure; failed
    /// sub-processes are just statuses.
    pub async fn run(mut self) -> Result<LifetimeOutcome> {
        info!(
            lineage = %self.core.lineage(),
            lifetime = self.core.lifetime(),
            offset = self.core.offset(),
            "runtime started"
        );

        let mut event = CoreEvent::Started;

        loop {
            debug!(?event, "core received event");
            let step = self.core.step(event);
            self.publish();

            let mut next = None;
            for command in step.commands {
                match command {
                    CoreCommand::StartChild { child_id, batch } => {
                        self.start_child(child_id, batch);
                    }
                    CoreCommand::FetchBatch { offset } => {
                        next = Some(CoreEvent::BatchFetched(self.fetch_batch(offset).await?));
                    }
                    CoreCommand::AwaitAny | CoreCommand::AwaitAll => {
                        let completions = self.children.join_any().await.ok_or_else(|| {
                            BatchWindowError::Substrate(
                                "awaiting sub-processes but none are in flight".to_string(),
                            )
                        })?;
                        next = Some(CoreEvent::ChildrenCompleted(completions));
                    }
                    CoreCommand::Checkpoint(continuation) => {
                        run_blocking(&self.store, move |store| store.persist(&continuation))
                            .await?;
                        next = Some(CoreEvent::CheckpointPersisted);
                    }
                    CoreCommand::Finish => {
                        return Ok(self.finish());
                    }
                }
            }

            event = next.ok_or_else(|| {
                BatchWindowError::Substrate(format!(
                    "orchestrator core stalled in phase {:?}",
                    self.core.phase()
                ))
            })?;
        }
    }

    fn start_child(&mut self, child_id: String, batch: Batch) {
        let child = self.launcher.start_child(child_id.clone(), batch);
        self.children.spawn(child_id, child);
    }

    async fn fetch_batch(&self, offset: u64) -> Result<Batch> {
        let params = self.core.params();
        let source = Arc::clone(&self.source);

        self.fetcher
            .invoke("next_batch", || {
                let source = Arc::clone(&source);
                async move {
                    source
                        .next_batch(params.batch_size, params.total_records, offset)
                        .await
                }
            })
            .await
            .map_err(|e| BatchWindowError::Source(format!("batch at offset {offset}: {e}")))
    }

    fn publish(&mut self) {
        let version = self.core.registry().version();
        if self.published_version != Some(version) {
            self.publisher.publish(self.core.snapshot());
            self.published_version = Some(version);
        }
    }

    fn finish(self) -> LifetimeOutcome {
        let status = self.core.snapshot();
        match self.core.continuation().cloned() {
            Some(continuation) => LifetimeOutcome::ContinuedAsNew {
                continuation,
                status,
                in_flight: self.children,
            },
            None => {
                info!(
                    launched = self.core.launched(),
                    tracked = status.len(),
                    "runtime exiting"
                );
                LifetimeOutcome::Completed { status }
            }
        }
    }
}
