// src/engine/handlers.rs

//! Event handling logic for the orchestrator core.

use tracing::{debug, info, warn};

use crate::engine::core::{LifetimeContext, LoopState};
use crate::engine::registry::StatusRegistry;
use crate::engine::{ChildOutcome, Completion, OrchestrationParams, Phase, SubProcessStatus};
use crate::source::Batch;
use crate::substrate::Continuation;
use crate::types::ReconcilePolicy;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Pull the batch at `offset`; answer with `BatchFetched`.
    FetchBatch { offset: u64 },
    /// Start a sub-process. Produces no event of its own.
    StartChild { child_id: String, batch: Batch },
    /// Admission gate: wait until at least one in-flight sub-process resolves.
    AwaitAny,
    /// Drain: wait for the next in-flight sub-process to resolve.
    AwaitAll,
    /// Persist this continuation; answer with `CheckpointPersisted`.
    Checkpoint(Continuation),
    /// The lifetime is over.
    Finish,
}

/// Decision returned by the core after handling a single `CoreEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    /// Commands for the IO shell, in order. At most one of them produces the
    /// next event.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn next(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    /// No commands: the event was ignored.
    fn ignored() -> Self {
        Self::next(Vec::new())
    }

    fn finished() -> Self {
        Self {
            commands: vec![CoreCommand::Finish],
            keep_running: false,
        }
    }
}

pub(crate) fn handle_start(state: &mut LoopState, ctx: &LifetimeContext) -> CoreStep {
    if state.phase != Phase::Paging || state.started {
        warn!(phase = ?state.phase, "duplicate start event; ignoring");
        return CoreStep::ignored();
    }
    state.started = true;

    info!(
        lineage = %ctx.lineage,
        lifetime = ctx.lifetime,
        offset = state.offset,
        carried = state.carried.len(),
        "orchestrator lifetime started"
    );
    CoreStep::next(vec![CoreCommand::FetchBatch {
        offset: state.offset,
    }])
}

pub(crate) fn handle_batch(
    state: &mut LoopState,
    registry: &mut StatusRegistry,
    ctx: &LifetimeContext,
    batch: Batch,
) -> CoreStep {
    if state.phase != Phase::Paging || state.parked.is_some() {
        warn!(phase = ?state.phase, "unexpected batch; ignoring");
        return CoreStep::ignored();
    }

    if batch.is_empty() {
        info!(
            offset = state.offset,
            launched = state.launched,
            "batch source exhausted; draining"
        );
        return enter_draining(state);
    }

    if state.window.len() >= ctx.limits.window_size {
        debug!(
            offset = state.offset,
            window = state.window.len(),
            "window full; parking batch at admission gate"
        );
        state.parked = Some(batch);
        return CoreStep::next(vec![CoreCommand::AwaitAny]);
    }

    launch(state, registry, ctx, batch)
}

pub(crate) fn handle_completions(
    state: &mut LoopState,
    registry: &mut StatusRegistry,
    ctx: &LifetimeContext,
    completions: Vec<Completion>,
) -> CoreStep {
    for completion in &completions {
        apply_completion(registry, completion);
        if !state.window.remove(&completion.child_id) && !state.carried.remove(&completion.child_id)
        {
            warn!(child_id = %completion.child_id, "completion for sub-process not in flight");
        }
    }

    match state.phase {
        Phase::Paging => match state.parked.take() {
            Some(batch) if state.window.len() < ctx.limits.window_size => {
                launch(state, registry, ctx, batch)
            }
            Some(batch) => {
                state.parked = Some(batch);
                CoreStep::next(vec![CoreCommand::AwaitAny])
            }
            None => {
                warn!("completion while paging with no batch at the gate");
                CoreStep::ignored()
            }
        },
        Phase::Draining => {
            if state.window.is_empty() && state.carried.is_empty() {
                finish(state)
            } else {
                CoreStep::next(vec![CoreCommand::AwaitAll])
            }
        }
        Phase::Checkpointing | Phase::Done => {
            warn!(phase = ?state.phase, "completion after the loop ended; ignoring");
            CoreStep::ignored()
        }
    }
}

pub(crate) fn handle_checkpoint_persisted(state: &mut LoopState) -> CoreStep {
    if state.phase != Phase::Checkpointing {
        warn!(phase = ?state.phase, "checkpoint confirmation without a pending checkpoint");
        return CoreStep::ignored();
    }
    finish(state)
}

/// Record a resolved sub-process in the registry.
///
/// This is the only effect a completion has on its own; it never changes
/// the control flow of the loop.
pub fn apply_completion(registry: &mut StatusRegistry, completion: &Completion) {
    match &completion.outcome {
        ChildOutcome::Completed => {
            info!(child_id = %completion.child_id, "sub-process succeeded");
            registry.resolve(&completion.child_id, SubProcessStatus::Completed);
        }
        ChildOutcome::Failed(reason) => {
            warn!(child_id = %completion.child_id, %reason, "sub-process failed");
            registry.resolve(&completion.child_id, SubProcessStatus::Failed);
        }
    }
}

fn launch(
    state: &mut LoopState,
    registry: &mut StatusRegistry,
    ctx: &LifetimeContext,
    batch: Batch,
) -> CoreStep {
    let child_id = ctx.lineage.child_id(state.offset);
    registry.begin(&child_id);
    state.window.insert(child_id.clone());

    debug!(
        %child_id,
        offset = state.offset,
        records = batch.len(),
        window = state.window.len(),
        "launching sub-process"
    );

    let mut commands = vec![CoreCommand::StartChild { child_id, batch }];

    state.offset += ctx.params.batch_size;
    state.launched += 1;

    if state.launched >= ctx.limits.continue_as_new_threshold {
        commands.push(begin_checkpoint(state, ctx));
    } else {
        commands.push(CoreCommand::FetchBatch {
            offset: state.offset,
        });
    }

    CoreStep::next(commands)
}

fn begin_checkpoint(state: &mut LoopState, ctx: &LifetimeContext) -> CoreCommand {
    state.phase = Phase::Checkpointing;

    let carried = match ctx.limits.reconcile {
        ReconcilePolicy::Abandon => Vec::new(),
        ReconcilePolicy::CarryForward => state
            .window
            .iter()
            .chain(state.carried.iter())
            .cloned()
            .collect(),
    };

    let continuation = Continuation {
        lineage: ctx.lineage.to_string(),
        lifetime: ctx.lifetime,
        carried,
        params: OrchestrationParams {
            offset: state.offset,
            ..ctx.params
        },
    };

    info!(
        launched = state.launched,
        offset = state.offset,
        in_flight = state.window.len() + state.carried.len(),
        reconcile = ?ctx.limits.reconcile,
        "launch threshold reached; continuing as new"
    );

    state.continuation = Some(continuation.clone());
    CoreCommand::Checkpoint(continuation)
}

fn enter_draining(state: &mut LoopState) -> CoreStep {
    state.phase = Phase::Draining;
    if state.window.is_empty() && state.carried.is_empty() {
        finish(state)
    } else {
        CoreStep::next(vec![CoreCommand::AwaitAll])
    }
}

fn finish(state: &mut LoopState) -> CoreStep {
    info!(launched = state.launched, offset = state.offset, "orchestrator lifetime done");
    state.phase = Phase::Done;
    CoreStep::finished()
}
