// src/activity/invoker.rs

//! Timeout + retry + pool-capacity wrapper around unit-of-work calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::activity::ActivityError;
use crate::config::ActivitySection;

/// Backoff between attempts never exceeds this.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Per-invocation timeout and retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub start_to_close_timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
}

impl RetryPolicy {
    /// Policy for light invocations (record processing, batch fetches).
    pub fn from_config(cfg: &ActivitySection) -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(cfg.start_to_close_timeout_secs),
            max_attempts: cfg.max_attempts,
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            backoff_coefficient: cfg.backoff_coefficient,
        }
    }

    /// Same retry settings, CPU-paired timeout.
    pub fn cpu_from_config(cfg: &ActivitySection) -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(cfg.cpu_start_to_close_timeout_secs),
            ..Self::from_config(cfg)
        }
    }

    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.backoff_coefficient.powi(exp);
        let secs = self.initial_backoff.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            MAX_BACKOFF
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ActivitySection::default())
    }
}

/// Shared capacity of the unit-of-work executor pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running invocation.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Runs invocations against a [`WorkerPool`] under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Invoker {
    pool: WorkerPool,
    policy: RetryPolicy,
}

impl Invoker {
    pub fn new(pool: WorkerPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Another invoker sharing this one's pool.
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            pool: self.pool.clone(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails non-retryably, or runs out of
    /// attempts.
    ///
    /// A pool permit is held only while an attempt runs, not during backoff.
    pub async fn invoke<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, ActivityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = {
                let _permit = self
                    .pool
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| ActivityError::NonRetryable("worker pool closed".to_string()))?;

                let timeout = self.policy.start_to_close_timeout;
                match tokio::time::timeout(timeout, call()).await {
                    Ok(res) => res,
                    Err(_) => Err(ActivityError::TimedOut(timeout)),
                }
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "invocation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "invocation failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    debug!(label, attempt, error = %err, "invocation failed permanently");
                    return Err(err);
                }
            }
        }
    }
}
