// src/substrate/side_effect.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{debug, trace};

/// Log of values produced by non-deterministic side effects.
///
/// The first call for a key runs the producer and records its value; every
/// later call for that key returns the recorded value without running it.
#[derive(Debug, Default)]
pub struct SideEffectLog {
    entries: Mutex<HashMap<String, u64>>,
}

impl SideEffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_once(&self, key: &str, produce: impl FnOnce() -> u64) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(&value) = entries.get(key) {
            trace!(key, value, "replaying recorded side effect");
            return value;
        }

        let value = produce();
        entries.insert(key.to_string(), value);
        debug!(key, value, "recorded side effect");
        value
    }

    /// Drop the record for `key` once nothing can replay it any more.
    pub fn forget(&self, key: &str) -> Option<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live source of randomness. Only ever consulted through a
/// [`DeterministicRandom`].
pub trait RandomSource: Send + Sync {
    /// A value in `[0, 100)`.
    fn roll_percent(&self) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn roll_percent(&self) -> u32 {
        rand::thread_rng().gen_range(0..100)
    }
}

/// Always rolls the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u32);

impl RandomSource for FixedRandom {
    fn roll_percent(&self) -> u32 {
        self.0 % 100
    }
}

/// Randomness that is captured once per key and replayed afterwards.
#[derive(Clone)]
pub struct DeterministicRandom {
    log: Arc<SideEffectLog>,
    source: Arc<dyn RandomSource>,
}

impl fmt::Debug for DeterministicRandom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicRandom")
            .field("recorded", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl DeterministicRandom {
    pub fn new(log: Arc<SideEffectLog>, source: Arc<dyn RandomSource>) -> Self {
        Self { log, source }
    }

    /// Fresh log backed by the thread-local RNG.
    pub fn live() -> Self {
        Self::new(Arc::new(SideEffectLog::new()), Arc::new(ThreadRandom))
    }

    /// Fresh log whose rolls are all `value`.
    pub fn fixed(value: u32) -> Self {
        Self::new(Arc::new(SideEffectLog::new()), Arc::new(FixedRandom(value)))
    }

    /// Roll in `[0, 100)` for `key`, replaying any earlier roll for it.
    pub fn percent(&self, key: &str) -> u32 {
        let source = Arc::clone(&self.source);
        self.log
            .record_once(key, move || u64::from(source.roll_percent())) as u32
    }

    pub fn forget(&self, key: &str) {
        self.log.forget(key);
    }

    pub fn log(&self) -> &Arc<SideEffectLog> {
        &self.log
    }
}
