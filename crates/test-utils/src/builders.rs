#![allow(dead_code)]

use std::path::PathBuf;

use batchwindow::config::{ConfigFile, RawConfigFile};
use batchwindow::engine::{CoreLimits, OrchestrationParams};
use batchwindow::types::{FanOutPolicy, ReconcilePolicy};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults of every section.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn workflow_id(mut self, id: &str) -> Self {
        self.config.orchestrator.workflow_id = id.to_string();
        self
    }

    pub fn batch_size(mut self, n: u64) -> Self {
        self.config.orchestrator.batch_size = n;
        self
    }

    pub fn window_size(mut self, n: usize) -> Self {
        self.config.orchestrator.window_size = n;
        self
    }

    pub fn threshold(mut self, n: u64) -> Self {
        self.config.orchestrator.continue_as_new_threshold = n;
        self
    }

    pub fn total_records(mut self, n: u64) -> Self {
        self.config.orchestrator.total_records = n;
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.config.orchestrator.offset = n;
        self
    }

    pub fn reconcile(mut self, policy: ReconcilePolicy) -> Self {
        self.config.orchestrator.reconcile = policy;
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.orchestrator.checkpoint_path = Some(path.into());
        self
    }

    pub fn policy(mut self, policy: FanOutPolicy) -> Self {
        self.config.child.policy = policy;
        self
    }

    pub fn veto_threshold(mut self, n: u32) -> Self {
        self.config.child.veto_threshold = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.activity.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.activity.initial_backoff_ms = ms;
        self
    }

    pub fn max_concurrent_activities(mut self, n: usize) -> Self {
        self.config.worker.max_concurrent_activities = n;
        self
    }

    /// The raw form, for tests that expect validation to fail.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Limits with the given window and threshold, abandoning on continue-as-new.
pub fn limits(window_size: usize, continue_as_new_threshold: u64) -> CoreLimits {
    CoreLimits {
        window_size,
        continue_as_new_threshold,
        reconcile: ReconcilePolicy::Abandon,
    }
}

pub fn params(offset: u64, batch_size: u64, total_records: u64) -> OrchestrationParams {
    OrchestrationParams {
        offset,
        batch_size,
        total_records,
    }
}
