#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::{oneshot, Notify};

use batchwindow::child::{ChildError, ChildLauncher};
use batchwindow::source::Batch;
use batchwindow::types::BoxFuture;

/// A launcher whose sub-processes resolve as soon as they are polled.
///
/// - records which children were started, with their batches
/// - fails the ids passed to `failing` with a veto.
#[derive(Default)]
pub struct InstantLauncher {
    started: Mutex<Vec<(String, Batch)>>,
    failing: HashSet<String>,
}

impl InstantLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            started: Mutex::new(Vec::new()),
            failing: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Child ids in start order.
    pub fn started_ids(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn started(&self) -> Vec<(String, Batch)> {
        self.started.lock().unwrap().clone()
    }
}

impl ChildLauncher for InstantLauncher {
    fn start_child(
        &self,
        child_id: String,
        batch: Batch,
    ) -> BoxFuture<'static, Result<(), ChildError>> {
        self.started.lock().unwrap().push((child_id.clone(), batch));
        let fail = self.failing.contains(&child_id);
        Box::pin(async move {
            if fail {
                Err(ChildError::Vetoed { child_id, roll: 0 })
            } else {
                Ok(())
            }
        })
    }
}

/// A launcher whose sub-processes stay running until the test resolves them
/// with [`GatedLauncher::complete`].
#[derive(Default)]
pub struct GatedLauncher {
    started: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, oneshot::Sender<Result<(), ChildError>>>>,
    notify: Notify,
}

impl GatedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Ids started but not yet resolved by the test.
    pub fn pending(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.gates.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve a running child. Returns `false` if no such child is waiting.
    pub fn complete(&self, child_id: &str, outcome: Result<(), ChildError>) -> bool {
        match self.gates.lock().unwrap().remove(child_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn succeed(&self, child_id: &str) -> bool {
        self.complete(child_id, Ok(()))
    }

    pub fn fail(&self, child_id: &str) -> bool {
        self.complete(
            child_id,
            Err(ChildError::Vetoed {
                child_id: child_id.to_string(),
                roll: 0,
            }),
        )
    }

    /// Wait until at least `n` children have been started.
    pub async fn wait_for_starts(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.started.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl ChildLauncher for GatedLauncher {
    fn start_child(
        &self,
        child_id: String,
        _batch: Batch,
    ) -> BoxFuture<'static, Result<(), ChildError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(child_id.clone(), tx);
        self.started.lock().unwrap().push(child_id);
        self.notify.notify_waiters();

        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(ChildError::Panicked("gate dropped".to_string())))
        })
    }
}

