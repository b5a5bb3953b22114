#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use batchwindow::activity::ActivityError;
use batchwindow::source::{Batch, BatchSource, CorpusSource};
use batchwindow::types::BoxFuture;

/// A synthetic corpus source that records every offset it is asked for.
///
/// Can be told to fail transiently for the first N calls, or permanently at
/// one offset.
#[derive(Default)]
pub struct RecordingSource {
    inner: CorpusSource,
    requests: Mutex<Vec<u64>>,
    transient_failures: AtomicU32,
    fail_at: Option<u64>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            inner: CorpusSource::from_text(text),
            ..Self::default()
        }
    }

    /// Fail the first `n` calls with a retryable error.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every request for `offset` with a non-retryable error.
    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Offsets requested, in order, including failed attempts.
    pub fn requests(&self) -> Vec<u64> {
        self.requests.lock().unwrap().clone()
    }
}

impl BatchSource for RecordingSource {
    fn next_batch(
        &self,
        page_size: u64,
        total_size: u64,
        offset: u64,
    ) -> BoxFuture<'_, Result<Batch, ActivityError>> {
        self.requests.lock().unwrap().push(offset);

        let result = if self.fail_at == Some(offset) {
            Err(ActivityError::NonRetryable(format!("no batch at {offset}")))
        } else if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(ActivityError::Retryable("source hiccup".to_string()))
        } else {
            Ok(self.inner.page(page_size, total_size, offset))
        };

        Box::pin(async move { result })
    }
}
