#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use batchwindow::activity::{ActivityError, UnitOfWork};
use batchwindow::types::BoxFuture;

/// How a scripted record misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Fail retryably this many times, then succeed.
    FlakyTimes(u32),
    /// Always fail non-retryably.
    Broken,
    /// Sleep this long before succeeding.
    Slow(Duration),
}

/// A unit of work that counts its calls and follows per-record scripts.
#[derive(Default)]
pub struct ScriptedWork {
    scripts: HashMap<String, Script>,
    attempts: Mutex<HashMap<String, u32>>,
    process_calls: AtomicUsize,
    alt_calls: AtomicUsize,
    simulate_calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, record: &str, script: Script) -> Self {
        self.scripts.insert(record.to_string(), script);
        self
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn alt_calls(&self) -> usize {
        self.alt_calls.load(Ordering::SeqCst)
    }

    pub fn simulate_calls(&self) -> usize {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    /// Attempts made for `record` across both processing paths.
    pub fn attempts(&self, record: &str) -> u32 {
        self.attempts.lock().unwrap().get(record).copied().unwrap_or(0)
    }

    /// Records processed on the alternative path, sorted.
    pub fn alt_records(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }

    fn run(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(record.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let script = self.scripts.get(&record).copied();

        Box::pin(async move {
            match script {
                Some(Script::FlakyTimes(n)) if attempt <= n => {
                    Err(ActivityError::Retryable(format!("{record}: attempt {attempt}")))
                }
                Some(Script::Broken) => {
                    Err(ActivityError::NonRetryable(format!("{record}: broken")))
                }
                Some(Script::Slow(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(record)
                }
                _ => Ok(record),
            }
        })
    }
}

impl UnitOfWork for ScriptedWork {
    fn process(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        self.run(record)
    }

    fn process_alt(&self, record: String) -> BoxFuture<'_, Result<String, ActivityError>> {
        self.alt_calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(record.clone());
        self.run(record)
    }

    fn simulate(&self) -> BoxFuture<'_, Result<(), ActivityError>> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}
