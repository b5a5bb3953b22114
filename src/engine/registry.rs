// src/engine/registry.rs

//! Status registry and the read-only status query surface.
//!
//! The registry itself is plain data owned by the core. Readers never see
//! it: after every core step the runtime publishes an immutable
//! [`StatusSnapshot`] through a [`StatusPublisher`], and callers read the
//! latest one from a [`StatusHandle`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::SubProcessStatus;

/// Identity -> last known status for one lifetime. Entries are never removed.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    entries: BTreeMap<String, SubProcessStatus>,
    version: u64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly started sub-process as `Running`.
    ///
    /// Returns `false` (and leaves the entry alone) if the identity is
    /// already known.
    pub fn begin(&mut self, child_id: &str) -> bool {
        if let Some(existing) = self.entries.get(child_id) {
            warn!(child_id, status = %existing, "sub-process already registered; ignoring restart");
            return false;
        }
        self.entries
            .insert(child_id.to_string(), SubProcessStatus::Running);
        self.version += 1;
        true
    }

    /// Move `child_id` to a terminal status.
    ///
    /// Returns `false` if the identity is unknown, already terminal, or
    /// `status` is not terminal.
    pub fn resolve(&mut self, child_id: &str, status: SubProcessStatus) -> bool {
        if !status.is_terminal() {
            warn!(child_id, "refusing to resolve a sub-process back to RUNNING");
            return false;
        }

        match self.entries.get_mut(child_id) {
            Some(current) if *current == SubProcessStatus::Running => {
                *current = status;
                self.version += 1;
                debug!(child_id, %status, "sub-process resolved");
                true
            }
            Some(current) => {
                warn!(
                    child_id,
                    current = %current,
                    attempted = %status,
                    "sub-process already terminal"
                );
                false
            }
            None => {
                warn!(child_id, "completion for unknown sub-process; ignoring");
                false
            }
        }
    }

    pub fn get(&self, child_id: &str) -> Option<SubProcessStatus> {
        self.entries.get(child_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every change; lets the shell skip redundant publishes.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            entries: Arc::new(self.entries.clone()),
        }
    }
}

/// Immutable copy of a registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    entries: Arc<BTreeMap<String, SubProcessStatus>>,
}

impl StatusSnapshot {
    pub fn get(&self, child_id: &str) -> Option<SubProcessStatus> {
        self.entries.get(child_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SubProcessStatus)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn count(&self, status: SubProcessStatus) -> usize {
        self.entries.values().filter(|s| **s == status).count()
    }
}

/// Write side of the status query surface. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusPublisher {
    pub fn channel() -> (Self, StatusHandle) {
        let (tx, rx) = watch::channel(StatusSnapshot::default());
        (Self { tx: Arc::new(tx) }, StatusHandle { rx })
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(snapshot);
    }

    pub fn subscribe(&self) -> StatusHandle {
        StatusHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the status query surface.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusHandle {
    /// The latest published snapshot. Safe to call at any time.
    pub fn get_status(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }
}
