use std::collections::HashSet;

use proptest::prelude::*;
use batchwindow::engine::{
    ChildOutcome, Completion, CoreCommand, CoreEvent, CoreLimits, OrchestratorCore, Phase,
    SubProcessStatus,
};
use batchwindow::source::CorpusSource;
use batchwindow::substrate::LineageId;
use batchwindow::types::ReconcilePolicy;
use batchwindow_test_utils::builders::params;

#[derive(Debug, Clone)]
struct Scenario {
    window: usize,
    threshold: u64,
    batch_size: u64,
    total: u64,
    offset: u64,
    carry: bool,
    // Drives which in-flight children resolve, and how, at each wait.
    choices: Vec<u8>,
}

fn scenario_strategy() -> impl Strategy<Value = Scenario> {
    (
        1..6usize,
        1..40u64,
        1..20u64,
        0..400u64,
        0..100u64,
        any::<bool>(),
        proptest::collection::vec(any::<u8>(), 1..20),
    )
        .prop_map(|(window, threshold, batch_size, total, offset, carry, choices)| Scenario {
            window,
            threshold,
            batch_size,
            total,
            offset,
            carry,
            choices,
        })
}

/// Everything observed while driving one lifetime to `Finish`.
struct Trace {
    fetched: Vec<u64>,
    launched: u64,
    max_window: usize,
    core: OrchestratorCore,
}

fn drive(s: &Scenario) -> Result<Trace, TestCaseError> {
    let limits = CoreLimits {
        window_size: s.window,
        continue_as_new_threshold: s.threshold,
        reconcile: if s.carry {
            ReconcilePolicy::CarryForward
        } else {
            ReconcilePolicy::Abandon
        },
    };
    let source = CorpusSource::synthetic();
    let mut core = OrchestratorCore::new(
        LineageId::new("BatchParentWorkflow-1"),
        params(s.offset, s.batch_size, s.total),
        limits,
    );

    let mut choices = s.choices.iter().copied().cycle();
    let mut in_flight: Vec<String> = Vec::new();
    let mut terminal: HashSet<String> = HashSet::new();
    let mut fetched = Vec::new();
    let mut launched = 0;
    let mut max_window = 0;
    let mut event = CoreEvent::Started;

    for _ in 0..10_000 {
        let step = core.step(event);
        max_window = max_window.max(core.window_len());

        let snapshot = core.snapshot();
        for id in &terminal {
            prop_assert_ne!(snapshot.get(id), Some(SubProcessStatus::Running));
        }

        let mut next = None;
        let mut finished = false;
        for command in step.commands {
            match command {
                CoreCommand::FetchBatch { offset } => {
                    fetched.push(offset);
                    let batch = source.page(s.batch_size, s.total, offset);
                    next = Some(CoreEvent::BatchFetched(batch));
                }
                CoreCommand::StartChild { child_id, batch } => {
                    prop_assert!(!batch.is_empty());
                    prop_assert!(!in_flight.contains(&child_id));
                    in_flight.push(child_id);
                    launched += 1;
                }
                CoreCommand::AwaitAny | CoreCommand::AwaitAll => {
                    prop_assert!(!in_flight.is_empty());
                    let choice = choices.next().unwrap_or(0) as usize;
                    let resolve = 1 + choice % 2;
                    let mut completions = Vec::new();
                    for _ in 0..resolve.min(in_flight.len()) {
                        let child_id = in_flight.remove(choice % in_flight.len());
                        let outcome = if choice % 3 == 0 {
                            ChildOutcome::Failed("vetoed".to_string())
                        } else {
                            ChildOutcome::Completed
                        };
                        terminal.insert(child_id.clone());
                        completions.push(Completion { child_id, outcome });
                    }
                    next = Some(CoreEvent::ChildrenCompleted(completions));
                }
                CoreCommand::Checkpoint(_) => next = Some(CoreEvent::CheckpointPersisted),
                CoreCommand::Finish => finished = true,
            }
        }

        if finished {
            prop_assert!(!step.keep_running);
            return Ok(Trace {
                fetched,
                launched,
                max_window,
                core,
            });
        }
        event = match next {
            Some(event) => event,
            None => return Err(TestCaseError::fail("core stalled")),
        };
    }
    Err(TestCaseError::fail("core did not finish"))
}

proptest! {
    #[test]
    fn test_window_never_exceeds_limit(s in scenario_strategy()) {
        let trace = drive(&s)?;
        prop_assert!(trace.max_window <= s.window);
        prop_assert_eq!(trace.core.phase(), Phase::Done);
    }

    #[test]
    fn test_fetch_offsets_strictly_increase_by_batch_size(s in scenario_strategy()) {
        let trace = drive(&s)?;
        prop_assert_eq!(trace.fetched.first().copied(), Some(s.offset));
        for pair in trace.fetched.windows(2) {
            prop_assert_eq!(pair[1], pair[0] + s.batch_size);
        }
    }

    #[test]
    fn test_lifetime_ends_at_threshold_or_exhaustion(s in scenario_strategy()) {
        let trace = drive(&s)?;
        let remaining = s.total.saturating_sub(s.offset).div_ceil(s.batch_size);

        match trace.core.continuation() {
            Some(continuation) => {
                prop_assert_eq!(trace.launched, s.threshold);
                prop_assert_eq!(continuation.params.offset, s.offset + s.threshold * s.batch_size);
                prop_assert_eq!(continuation.params.offset, trace.core.offset());
                if s.carry {
                    prop_assert_eq!(continuation.carried.len(), trace.core.in_flight().len());
                } else {
                    prop_assert!(continuation.carried.is_empty());
                }
            }
            None => {
                prop_assert_eq!(trace.launched, remaining);
                prop_assert!(trace.launched < s.threshold);
                let snapshot = trace.core.snapshot();
                prop_assert_eq!(snapshot.count(SubProcessStatus::Running), 0);
                prop_assert_eq!(snapshot.len() as u64, remaining);
            }
        }
    }
}
