// src/child/launcher.rs

//! Pluggable sub-process launcher.
//!
//! The orchestrator runtime never calls a controller directly; it asks a
//! `ChildLauncher` for the completion future of a new sub-process and spawns
//! it. Tests swap in launchers that complete on demand.

use std::sync::Arc;

use tracing::debug;

use crate::child::{BatchController, ChildError};
use crate::source::Batch;
use crate::types::BoxFuture;

pub trait ChildLauncher: Send + Sync {
    /// Start the sub-process `child_id` for `batch`.
    ///
    /// The returned future is the sub-process itself; it is independent of
    /// the launcher and of the lifetime that started it.
    fn start_child(
        &self,
        child_id: String,
        batch: Batch,
    ) -> BoxFuture<'static, Result<(), ChildError>>;
}

/// Production launcher: runs each batch through a shared [`BatchController`]
/// and releases the child's recorded side effects once it resolves.
#[derive(Debug, Clone)]
pub struct ControllerLauncher {
    controller: Arc<BatchController>,
}

impl ControllerLauncher {
    pub fn new(controller: BatchController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}

impl ChildLauncher for ControllerLauncher {
    fn start_child(
        &self,
        child_id: String,
        batch: Batch,
    ) -> BoxFuture<'static, Result<(), ChildError>> {
        let controller = Arc::clone(&self.controller);
        debug!(%child_id, records = batch.len(), "starting sub-process");
        Box::pin(async move {
            let result = controller.process_batch(&child_id, batch).await;
            controller.release(&child_id);
            result
        })
    }
}
