// src/engine/core.rs

//! Pure core state machine for one orchestrator lifetime.
//!
//! The core consumes [`CoreEvent`]s and returns [`CoreStep`]s describing what
//! the IO shell should do next. It owns the offset counter, the admission
//! window and the status registry, and has no channels, no Tokio types and
//! performs no IO, so every scheduling decision can be unit tested by
//! feeding it events by hand.
//!
//! ```text
//! Paging --(threshold reached)--> Checkpointing --(persisted)--> Done
//! Paging --(empty batch)--------> Draining ------(window empty)--> Done
//! ```

use std::collections::BTreeSet;

use crate::config::OrchestratorSection;
use crate::engine::handlers::{
    handle_batch, handle_checkpoint_persisted, handle_completions, handle_start, CoreStep,
};
use crate::engine::registry::{StatusRegistry, StatusSnapshot};
use crate::engine::{CoreEvent, OrchestrationParams, Phase};
use crate::source::Batch;
use crate::substrate::{Continuation, LineageId};
use crate::types::ReconcilePolicy;

/// Fixed limits for every lifetime of a lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreLimits {
    /// Maximum sub-processes in the admission window.
    pub window_size: usize,
    /// Launches per lifetime before continuing as new.
    pub continue_as_new_threshold: u64,
    pub reconcile: ReconcilePolicy,
}

impl CoreLimits {
    pub fn from_config(cfg: &OrchestratorSection) -> Self {
        Self {
            window_size: cfg.window_size,
            continue_as_new_threshold: cfg.continue_as_new_threshold,
            reconcile: cfg.reconcile,
        }
    }
}

impl Default for CoreLimits {
    fn default() -> Self {
        Self::from_config(&OrchestratorSection::default())
    }
}

/// Read-only inputs of one lifetime.
#[derive(Debug, Clone)]
pub(crate) struct LifetimeContext {
    pub(crate) lineage: LineageId,
    pub(crate) lifetime: u32,
    pub(crate) limits: CoreLimits,
    pub(crate) params: OrchestrationParams,
}

/// Mutable loop state of one lifetime.
#[derive(Debug)]
pub(crate) struct LoopState {
    pub(crate) phase: Phase,
    pub(crate) started: bool,
    pub(crate) offset: u64,
    pub(crate) launched: u64,
    /// The admission window: identities launched by this lifetime and not
    /// yet resolved.
    pub(crate) window: BTreeSet<String>,
    /// Identities inherited from the previous lifetime. Tracked, but outside
    /// the window.
    pub(crate) carried: BTreeSet<String>,
    /// Batch waiting at the admission gate.
    pub(crate) parked: Option<Batch>,
    pub(crate) continuation: Option<Continuation>,
}

/// Pure core runtime state.
#[derive(Debug)]
pub struct OrchestratorCore {
    ctx: LifetimeContext,
    state: LoopState,
    registry: StatusRegistry,
}

impl OrchestratorCore {
    pub fn new(lineage: LineageId, params: OrchestrationParams, limits: CoreLimits) -> Self {
        Self {
            ctx: LifetimeContext {
                lineage,
                lifetime: 1,
                limits,
                params,
            },
            state: LoopState {
                phase: Phase::Paging,
                started: false,
                offset: params.offset,
                launched: 0,
                window: BTreeSet::new(),
                carried: BTreeSet::new(),
                parked: None,
                continuation: None,
            },
            registry: StatusRegistry::new(),
        }
    }

    /// Number this lifetime within its lineage (1-based).
    pub fn with_lifetime(mut self, lifetime: u32) -> Self {
        self.ctx.lifetime = lifetime;
        self
    }

    /// Track sub-processes inherited from the previous lifetime. They show up
    /// as `RUNNING` until they resolve and the drain waits for them, but they
    /// never occupy the admission window.
    pub fn with_carried(mut self, carried: impl IntoIterator<Item = String>) -> Self {
        for child_id in carried {
            if self.registry.begin(&child_id) {
                self.state.carried.insert(child_id);
            }
        }
        self
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::Started => handle_start(&mut self.state, &self.ctx),
            CoreEvent::BatchFetched(batch) => {
                handle_batch(&mut self.state, &mut self.registry, &self.ctx, batch)
            }
            CoreEvent::ChildrenCompleted(completions) => {
                handle_completions(&mut self.state, &mut self.registry, &self.ctx, completions)
            }
            CoreEvent::CheckpointPersisted => handle_checkpoint_persisted(&mut self.state),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn lineage(&self) -> &LineageId {
        &self.ctx.lineage
    }

    pub fn lifetime(&self) -> u32 {
        self.ctx.lifetime
    }

    pub fn limits(&self) -> CoreLimits {
        self.ctx.limits
    }

    /// Parameters this lifetime started from.
    pub fn params(&self) -> OrchestrationParams {
        self.ctx.params
    }

    /// Offset of the next batch to fetch.
    pub fn offset(&self) -> u64 {
        self.state.offset
    }

    pub fn launched(&self) -> u64 {
        self.state.launched
    }

    pub fn window_len(&self) -> usize {
        self.state.window.len()
    }

    /// Every identity this lifetime still waits on, window and carried.
    pub fn in_flight(&self) -> Vec<String> {
        self.state
            .window
            .iter()
            .chain(self.state.carried.iter())
            .cloned()
            .collect()
    }

    /// Whether a batch is waiting at the admission gate.
    pub fn is_gated(&self) -> bool {
        self.state.parked.is_some()
    }

    /// Set once the launch threshold is reached.
    pub fn continuation(&self) -> Option<&Continuation> {
        self.state.continuation.as_ref()
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.registry.snapshot()
    }
}
