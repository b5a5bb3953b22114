// tests/lineage_continue_as_new.rs

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use batchwindow::activity::WorkerPool;
use batchwindow::child::{BatchController, ControllerLauncher};
use batchwindow::engine::{CoreLimits, SubProcessStatus};
use batchwindow::errors::BatchWindowError;
use batchwindow::substrate::{
    CheckpointStore, Continuation, DeterministicRandom, FileCheckpointStore, FixedRandom,
    MemoryCheckpointStore, SideEffectLog,
};
use batchwindow::types::ReconcilePolicy;
use batchwindow_test_utils::launchers::{GatedLauncher, InstantLauncher};
use batchwindow_test_utils::sources::RecordingSource;
use batchwindow_test_utils::stores::{FailingCheckpointStore, RecordingCheckpointStore};
use batchwindow_test_utils::work::ScriptedWork;
use common::{fast_retry, init_tracing, limits, lineage, params, with_timeout, LINEAGE};

fn child(offset: u64) -> String {
    format!("BatchChildWorkflow-1-{offset}")
}

#[tokio::test]
async fn test_continues_as_new_after_500_launches() {
    init_tracing();
    with_timeout(async {
        let source = Arc::new(RecordingSource::new());
        let launcher = Arc::new(InstantLauncher::new());
        let store = Arc::new(RecordingCheckpointStore::new());
        let l = lineage(limits(4, 500), source.clone(), launcher.clone(), store.clone());

        let report = l.run(params(0, 50, 30_000), 1).await.expect("lineage failed");

        assert_eq!(report.lifetimes, 2);
        let continuation = report.last_continuation.as_ref().expect("no continuation");
        assert_eq!(continuation.lifetime, 1);
        assert_eq!(continuation.params, params(25_000, 50, 30_000));
        assert!(continuation.carried.is_empty());
        assert_eq!(report.final_params.offset, 25_000);

        // No batch skipped or repeated across the boundary.
        let expected: Vec<u64> = (0..=600).map(|i| i * 50).collect();
        assert_eq!(source.requests(), expected);

        let ids = launcher.started_ids();
        assert_eq!(ids.len(), 600);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 600);
        assert_eq!(ids[500], child(25_000));

        // The final registry only covers the final lifetime.
        assert_eq!(report.status.len(), 100);
        assert_eq!(report.status.count(SubProcessStatus::Completed), 100);

        assert_eq!(store.history(), vec![continuation.clone()]);
        assert_eq!(store.load().unwrap(), None);
    })
    .await;
}

#[tokio::test]
async fn test_abandon_stops_tracking_in_flight_children() {
    init_tracing();
    with_timeout(async {
        let source = Arc::new(RecordingSource::new());
        let launcher = Arc::new(GatedLauncher::new());
        let l = lineage(
            limits(4, 2),
            source,
            launcher.clone(),
            Arc::new(MemoryCheckpointStore::new()),
        );
        let run = tokio::spawn(l.run(params(0, 10, 30), 1));

        launcher.wait_for_starts(3).await;
        assert!(launcher.succeed(&child(20)));

        let report = run.await.expect("lineage panicked").expect("lineage failed");

        assert_eq!(report.lifetimes, 2);
        assert_eq!(report.status.len(), 1);
        assert_eq!(report.status.get(&child(20)), Some(SubProcessStatus::Completed));
        // Abandoned, not cancelled.
        assert_eq!(launcher.pending(), vec![child(0), child(10)]);
    })
    .await;
}

#[tokio::test]
async fn test_carry_forward_tracks_children_across_lifetimes() {
    init_tracing();
    with_timeout(async {
        let source = Arc::new(RecordingSource::new());
        let launcher = Arc::new(GatedLauncher::new());
        let carry = CoreLimits {
            reconcile: ReconcilePolicy::CarryForward,
            ..limits(4, 2)
        };
        let store = Arc::new(MemoryCheckpointStore::new());
        let l = lineage(carry, source.clone(), launcher.clone(), store);
        let status = l.status_handle();
        let run = tokio::spawn(l.run(params(0, 10, 30), 1));

        launcher.wait_for_starts(3).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let snapshot = status.get_status();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.count(SubProcessStatus::Running), 3);

        launcher.succeed(&child(20));
        launcher.succeed(&child(10));
        launcher.fail(&child(0));

        let report = run.await.expect("lineage panicked").expect("lineage failed");

        assert_eq!(report.lifetimes, 2);
        let continuation = report.last_continuation.expect("no continuation");
        assert_eq!(continuation.carried, vec![child(0), child(10)]);
        assert_eq!(report.status.get(&child(0)), Some(SubProcessStatus::Failed));
        assert_eq!(report.status.get(&child(10)), Some(SubProcessStatus::Completed));
        assert_eq!(report.status.get(&child(20)), Some(SubProcessStatus::Completed));
        assert!(launcher.pending().is_empty());
        assert_eq!(source.requests(), vec![0, 10, 20, 30]);
    })
    .await;
}

#[tokio::test]
async fn test_retained_state_does_not_grow_with_lifetimes() {
    init_tracing();
    with_timeout(async {
        let log = Arc::new(SideEffectLog::new());
        let random = DeterministicRandom::new(log.clone(), Arc::new(FixedRandom(99)));
        let controller =
            BatchController::new(Arc::new(ScriptedWork::new()), WorkerPool::new(8), random)
                .with_retry_policy(fast_retry());
        let store = Arc::new(MemoryCheckpointStore::new());
        let l = lineage(
            limits(4, 10),
            Arc::new(RecordingSource::new()),
            Arc::new(ControllerLauncher::new(controller)),
            store.clone(),
        );

        let report = l.run(params(0, 1, 195), 1).await.expect("lineage failed");

        assert_eq!(report.lifetimes, 20);
        let last = report.last_continuation.expect("no continuation");
        assert_eq!(last.lifetime, 19);
        assert_eq!(last.params.offset, 190);
        assert_eq!(report.status.len(), 5);
        assert_eq!(report.status.count(SubProcessStatus::Completed), 5);
        assert_eq!(store.load().unwrap(), None);

        // Children abandoned at the last checkpoint may still be finishing.
        for _ in 0..100 {
            if log.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Every veto roll was dropped once its sub-process resolved.
        assert!(log.is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_slow_checkpoint_write_does_not_stall_other_tasks() {
    with_timeout(async {
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let store =
            Arc::new(RecordingCheckpointStore::new().with_delay(Duration::from_millis(300)));
        let l = lineage(
            limits(4, 2),
            Arc::new(RecordingSource::new()),
            Arc::new(InstantLauncher::new()),
            store.clone(),
        );

        let report = l.run(params(0, 10, 30), 1).await.expect("lineage failed");
        ticker.abort();

        assert_eq!(report.lifetimes, 2);
        assert_eq!(store.history().len(), 1);
        // On the single-threaded test runtime the ticker only runs if the
        // write happened off the async thread.
        assert!(ticks.load(Ordering::SeqCst) >= 20);
    })
    .await;
}

#[tokio::test]
async fn test_checkpoint_persist_failure_is_fatal() {
    with_timeout(async {
        let store = Arc::new(FailingCheckpointStore::new());
        let l = lineage(
            limits(4, 2),
            Arc::new(RecordingSource::new()),
            Arc::new(InstantLauncher::new()),
            store.clone(),
        );

        match l.run(params(0, 10, 100), 1).await {
            Err(BatchWindowError::IoError(e)) => assert!(e.to_string().contains("disk full")),
            other => panic!("expected IO error, got {other:?}"),
        }
        assert_eq!(store.attempts(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_file_store_is_cleared_when_lineage_finishes() {
    with_timeout(async {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("checkpoint.toml");
        let store = Arc::new(FileCheckpointStore::new(&path));
        let l = lineage(
            limits(4, 2),
            Arc::new(RecordingSource::new()),
            Arc::new(InstantLauncher::new()),
            store.clone(),
        );

        let report = l.run(params(0, 10, 50), 1).await.expect("lineage failed");

        assert_eq!(report.lifetimes, 3);
        assert!(!path.exists());
        assert_eq!(store.load().unwrap(), None);
    })
    .await;
}

#[tokio::test]
async fn test_resume_starts_from_persisted_offset() {
    init_tracing();
    with_timeout(async {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path().join("checkpoint.toml")));
        store
            .persist(&Continuation {
                lineage: LINEAGE.to_string(),
                lifetime: 4,
                carried: vec![child(0)],
                params: params(20, 10, 40),
            })
            .unwrap();

        let source = Arc::new(RecordingSource::new());
        let launcher = Arc::new(InstantLauncher::new());
        let l = lineage(limits(4, 500), source.clone(), launcher.clone(), store.clone());

        assert_eq!(l.starting_params(params(0, 10, 40), false).unwrap(), (params(0, 10, 40), 1));
        let (start, lifetime) = l.starting_params(params(0, 10, 40), true).unwrap();
        assert_eq!(start, params(20, 10, 40));
        assert_eq!(lifetime, 5);

        let report = l.run(start, lifetime).await.expect("lineage failed");

        assert_eq!(source.requests(), vec![20, 30, 40]);
        assert_eq!(launcher.started_ids(), vec![child(20), child(30)]);
        // Carried ids from a previous process are not tracked.
        assert_eq!(report.status.get(&child(0)), None);
        assert_eq!(store.load().unwrap(), None);
    })
    .await;
}

#[tokio::test]
async fn test_resume_ignores_checkpoint_of_other_lineage() {
    let store = Arc::new(MemoryCheckpointStore::new());
    store
        .persist(&Continuation {
            lineage: "BatchParentWorkflow-7".to_string(),
            lifetime: 1,
            carried: Vec::new(),
            params: params(500, 10, 1000),
        })
        .unwrap();
    let l = lineage(
        limits(4, 500),
        Arc::new(RecordingSource::new()),
        Arc::new(InstantLauncher::new()),
        store,
    );

    let (start, lifetime) = l.starting_params(params(0, 10, 1000), true).unwrap();
    assert_eq!(start.offset, 0);
    assert_eq!(lifetime, 1);
}
