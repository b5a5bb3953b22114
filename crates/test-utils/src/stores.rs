#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use batchwindow::errors::{BatchWindowError, Result};
use batchwindow::substrate::{CheckpointStore, Continuation, MemoryCheckpointStore};

/// A memory store that also remembers every continuation it was handed.
///
/// `with_delay` makes each persist block its thread for a while, like a slow
/// disk would.
#[derive(Default)]
pub struct RecordingCheckpointStore {
    inner: MemoryCheckpointStore,
    history: Mutex<Vec<Continuation>>,
    delay: Option<Duration>,
}

impl RecordingCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every continuation persisted so far, oldest first.
    pub fn history(&self) -> Vec<Continuation> {
        self.history.lock().unwrap().clone()
    }
}

impl CheckpointStore for RecordingCheckpointStore {
    fn persist(&self, continuation: &Continuation) -> Result<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.history.lock().unwrap().push(continuation.clone());
        self.inner.persist(continuation)
    }

    fn load(&self) -> Result<Option<Continuation>> {
        self.inner.load()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

/// A checkpoint store that refuses every write.
#[derive(Default)]
pub struct FailingCheckpointStore {
    attempts: AtomicUsize,
}

impl FailingCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for FailingCheckpointStore {
    fn persist(&self, _continuation: &Continuation) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BatchWindowError::IoError(std::io::Error::other("disk full")))
    }

    fn load(&self) -> Result<Option<Continuation>> {
        Ok(None)
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}
