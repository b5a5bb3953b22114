#![allow(dead_code)]

use std::sync::Arc;

use batchwindow::activity::{Invoker, RetryPolicy, WorkerPool};
use batchwindow::child::ChildLauncher;
use batchwindow::engine::{
    CoreLimits, Lineage, OrchestrationParams, OrchestratorCore, Runtime, StatusHandle,
    StatusPublisher,
};
use batchwindow::source::BatchSource;
use batchwindow::substrate::{CheckpointStore, LineageId};
use batchwindow_test_utils::stores::RecordingCheckpointStore;

pub use batchwindow_test_utils::builders::{ConfigFileBuilder, limits, params};
pub use batchwindow_test_utils::{init_tracing, with_timeout};

pub const LINEAGE: &str = "BatchParentWorkflow-1";

/// Retry policy with millisecond backoff so failing fetches don't slow tests.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        start_to_close_timeout: std::time::Duration::from_secs(2),
        max_attempts: 3,
        initial_backoff: std::time::Duration::from_millis(1),
        backoff_coefficient: 2.0,
    }
}

pub fn fetcher() -> Invoker {
    Invoker::new(WorkerPool::new(4), fast_retry())
}

pub fn new_core(p: OrchestrationParams, l: CoreLimits) -> OrchestratorCore {
    OrchestratorCore::new(LineageId::new(LINEAGE), p, l)
}

/// A single-lifetime runtime over a recording store, plus its status handle.
pub fn runtime<S, L>(
    p: OrchestrationParams,
    l: CoreLimits,
    source: Arc<S>,
    launcher: Arc<L>,
) -> (Runtime<S, L>, StatusHandle, Arc<RecordingCheckpointStore>)
where
    S: BatchSource + 'static,
    L: ChildLauncher + 'static,
{
    let store = Arc::new(RecordingCheckpointStore::new());
    let (publisher, handle) = StatusPublisher::channel();
    let rt = Runtime::new(
        new_core(p, l),
        source,
        launcher,
        store.clone() as Arc<dyn CheckpointStore>,
        fetcher(),
        publisher,
    );
    (rt, handle, store)
}

pub fn lineage<S, L>(
    l: CoreLimits,
    source: Arc<S>,
    launcher: Arc<L>,
    store: Arc<dyn CheckpointStore>,
) -> Lineage<S, L>
where
    S: BatchSource + 'static,
    L: ChildLauncher + 'static,
{
    Lineage::new(LineageId::new(LINEAGE), l, source, launcher, store, fetcher())
}
