// tests/child_controller.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use batchwindow::activity::{ActivityError, RetryPolicy, WorkerPool};
use batchwindow::child::{BatchController, ChildError, ChildLauncher, ControllerLauncher};
use batchwindow::substrate::{DeterministicRandom, RandomSource, SideEffectLog};
use batchwindow::types::FanOutPolicy;
use batchwindow_test_utils::work::{Script, ScriptedWork};
use common::{fast_retry, init_tracing, with_timeout};

fn batch(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("r{i}")).collect()
}

fn controller(work: Arc<ScriptedWork>, random: DeterministicRandom) -> BatchController {
    BatchController::new(work, WorkerPool::new(8), random).with_retry_policy(fast_retry())
}

/// Rolls 10, 20, 30, ... on successive calls.
struct Climbing(AtomicU32);

impl RandomSource for Climbing {
    fn roll_percent(&self) -> u32 {
        (self.0.fetch_add(1, Ordering::SeqCst) + 1) * 10 % 100
    }
}

#[tokio::test]
async fn test_uniform_veto_fails_batch_after_all_items_succeed() {
    init_tracing();
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new());
        let c = controller(work.clone(), DeterministicRandom::fixed(10));

        let result = c.process_batch("BatchChildWorkflow-1-0", batch(10)).await;

        assert_eq!(
            result,
            Err(ChildError::Vetoed {
                child_id: "BatchChildWorkflow-1-0".to_string(),
                roll: 10,
            })
        );
        assert_eq!(work.process_calls(), 10);
        assert_eq!(work.simulate_calls(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_uniform_passes_when_roll_is_high_enough() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new());
        let c = controller(work.clone(), DeterministicRandom::fixed(50));
        assert_eq!(c.process_batch("child", batch(3)).await, Ok(()));

        let c = controller(work.clone(), DeterministicRandom::fixed(0)).with_veto_threshold(0);
        assert_eq!(c.process_batch("child", batch(3)).await, Ok(()));
        assert_eq!(work.process_calls(), 6);
    })
    .await;
}

#[tokio::test]
async fn test_replayed_child_sees_the_same_roll() {
    with_timeout(async {
        let log = Arc::new(SideEffectLog::new());
        let random = DeterministicRandom::new(log.clone(), Arc::new(Climbing(AtomicU32::new(0))));
        let c = controller(Arc::new(ScriptedWork::new()), random);

        let first = c.process_batch("BatchChildWorkflow-1-0", batch(2)).await;
        let replay = c.process_batch("BatchChildWorkflow-1-0", batch(2)).await;
        let other = c.process_batch("BatchChildWorkflow-1-50", batch(2)).await;

        assert_eq!(first, replay);
        assert!(matches!(first, Err(ChildError::Vetoed { roll: 10, .. })));
        assert!(matches!(other, Err(ChildError::Vetoed { roll: 20, .. })));
        assert_eq!(log.len(), 2);
        assert_eq!(log.get("BatchChildWorkflow-1-0/veto"), Some(10));
    })
    .await;
}

#[tokio::test]
async fn test_launcher_releases_veto_roll_when_child_resolves() {
    with_timeout(async {
        let log = Arc::new(SideEffectLog::new());
        let random = DeterministicRandom::new(log.clone(), Arc::new(Climbing(AtomicU32::new(0))));
        let c = controller(Arc::new(ScriptedWork::new()), random);

        // Within one sub-process run the roll stays recorded for replay.
        let _ = c.process_batch("BatchChildWorkflow-1-0", batch(2)).await;
        assert_eq!(log.get("BatchChildWorkflow-1-0/veto"), Some(10));
        c.release("BatchChildWorkflow-1-0");
        assert!(log.is_empty());

        let launcher = ControllerLauncher::new(c);
        for i in 0..50u64 {
            let id = format!("BatchChildWorkflow-1-{}", i * 10);
            let _ = launcher.start_child(id, batch(1)).await;
            assert!(log.is_empty());
        }
    })
    .await;
}

#[tokio::test]
async fn test_partitioned_splits_at_midpoint() {
    init_tracing();
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new());
        // Roll 0 would veto a uniform batch; partitioned batches have no veto.
        let c = controller(work.clone(), DeterministicRandom::fixed(0))
            .with_policy(FanOutPolicy::Partitioned);

        assert_eq!(c.process_batch("child", batch(5)).await, Ok(()));
        assert_eq!(work.process_calls(), 2);
        assert_eq!(work.alt_calls(), 3);
        assert_eq!(work.alt_records(), vec!["r2", "r3", "r4"]);

        let single = Arc::new(ScriptedWork::new());
        let c = controller(single.clone(), DeterministicRandom::fixed(0))
            .with_policy(FanOutPolicy::Partitioned);
        assert_eq!(c.process_batch("child", batch(1)).await, Ok(()));
        assert_eq!(single.process_calls(), 0);
        assert_eq!(single.alt_calls(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_partitioned_failure_in_one_half_fails_batch() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new().script("r3", Script::Broken));
        let c = controller(work, DeterministicRandom::fixed(99))
            .with_policy(FanOutPolicy::Partitioned);

        match c.process_batch("child", batch(4)).await {
            Err(ChildError::ItemFailed { record, source }) => {
                assert_eq!(record, "r3");
                assert!(!source.is_retryable());
            }
            other => panic!("expected item failure, got {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn test_paired_runs_a_simulation_per_record() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new());
        let c = controller(work.clone(), DeterministicRandom::fixed(0))
            .with_policy(FanOutPolicy::Paired);

        assert_eq!(c.process_batch("child", batch(4)).await, Ok(()));
        assert_eq!(work.process_calls(), 4);
        assert_eq!(work.simulate_calls(), 4);
    })
    .await;
}

#[tokio::test]
async fn test_flaky_item_is_retried_until_success() {
    init_tracing();
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new().script("r1", Script::FlakyTimes(2)));
        let c = controller(work.clone(), DeterministicRandom::fixed(99));

        assert_eq!(c.process_batch("child", batch(3)).await, Ok(()));
        assert_eq!(work.attempts("r0"), 1);
        assert_eq!(work.attempts("r1"), 3);
    })
    .await;
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_batch() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new().script("r1", Script::FlakyTimes(10)));
        let c = controller(work.clone(), DeterministicRandom::fixed(99));

        match c.process_batch("child", batch(2)).await {
            Err(ChildError::ItemFailed { record, source }) => {
                assert_eq!(record, "r1");
                assert!(matches!(source, ActivityError::Retryable(_)));
            }
            other => panic!("expected item failure, got {other:?}"),
        }
        assert_eq!(work.attempts("r1"), 3);
    })
    .await;
}

#[tokio::test]
async fn test_non_retryable_item_is_not_retried() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new().script("r0", Script::Broken));
        let c = controller(work.clone(), DeterministicRandom::fixed(99));

        let result = c.process_batch("child", batch(1)).await;
        assert!(matches!(
            result,
            Err(ChildError::ItemFailed {
                source: ActivityError::NonRetryable(_),
                ..
            })
        ));
        assert_eq!(work.attempts("r0"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_slow_item_times_out() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new().script("r0", Script::Slow(Duration::from_secs(2))));
        let policy = RetryPolicy {
            start_to_close_timeout: Duration::from_millis(50),
            max_attempts: 1,
            ..fast_retry()
        };
        let c = BatchController::new(work, WorkerPool::new(2), DeterministicRandom::fixed(99))
            .with_retry_policy(policy);

        let result = c.process_batch("child", batch(1)).await;
        assert_eq!(
            result,
            Err(ChildError::ItemFailed {
                record: "r0".to_string(),
                source: ActivityError::TimedOut(Duration::from_millis(50)),
            })
        );
    })
    .await;
}

#[tokio::test]
async fn test_controller_launcher_returns_independent_future() {
    with_timeout(async {
        let work = Arc::new(ScriptedWork::new());
        let launcher =
            ControllerLauncher::new(controller(work.clone(), DeterministicRandom::fixed(10)));

        let child = launcher.start_child("BatchChildWorkflow-1-0".to_string(), batch(3));
        drop(launcher);

        let result = tokio::spawn(child).await.expect("child panicked");
        assert!(matches!(result, Err(ChildError::Vetoed { roll: 10, .. })));
        assert_eq!(work.process_calls(), 3);
    })
    .await;
}
