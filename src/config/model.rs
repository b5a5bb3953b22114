// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{FanOutPolicy, ReconcilePolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [orchestrator]
/// workflow_id = "BatchParentWorkflow-1"
/// batch_size = 50
/// window_size = 4
/// continue_as_new_threshold = 500
/// total_records = 1000
///
/// [child]
/// policy = "uniform"
///
/// [worker]
/// task_queue = "BatchParentWorkflowTaskQueue"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub child: ChildSection,

    #[serde(default)]
    pub activity: ActivitySection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub source: SourceSection,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub child: ChildSection,
    pub activity: ActivitySection,
    pub worker: WorkerSection,
    pub source: SourceSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            orchestrator: raw.orchestrator,
            child: raw.child,
            activity: raw.activity,
            worker: raw.worker,
            source: raw.source,
        }
    }

    /// Turn the validated config back into its raw form, e.g. to apply
    /// overrides and re-validate.
    pub fn into_raw(self) -> RawConfigFile {
        RawConfigFile {
            orchestrator: self.orchestrator,
            child: self.child,
            activity: self.activity,
            worker: self.worker,
            source: self.source,
        }
    }
}

/// `[orchestrator]` section: the parent control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// Identity of the lineage. Child ids are derived from its trailing
    /// `-<n>` segment.
    #[serde(default = "default_workflow_id")]
    pub workflow_id: String,

    /// Records per batch (and offset stride).
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Maximum number of sub-processes in flight.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Launches per lifetime before continuing as new.
    #[serde(default = "default_continue_as_new_threshold")]
    pub continue_as_new_threshold: u64,

    /// Total records the source should produce.
    #[serde(default = "default_total_records")]
    pub total_records: u64,

    /// Offset of the first lifetime.
    #[serde(default)]
    pub offset: u64,

    #[serde(default)]
    pub reconcile: ReconcilePolicy,

    /// Where to persist continuations. In-memory when absent.
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
}

fn default_workflow_id() -> String {
    "BatchParentWorkflow-1".to_string()
}

fn default_batch_size() -> u64 {
    50
}

fn default_window_size() -> usize {
    4
}

fn default_continue_as_new_threshold() -> u64 {
    500
}

fn default_total_records() -> u64 {
    1000
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            workflow_id: default_workflow_id(),
            batch_size: default_batch_size(),
            window_size: default_window_size(),
            continue_as_new_threshold: default_continue_as_new_threshold(),
            total_records: default_total_records(),
            offset: 0,
            reconcile: ReconcilePolicy::default(),
            checkpoint_path: None,
        }
    }
}

/// `[child]` section: the per-batch sub-process.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildSection {
    #[serde(default)]
    pub policy: FanOutPolicy,

    /// A uniform batch is vetoed when its roll in `[0, 100)` is below this.
    /// `0` disables the veto.
    #[serde(default = "default_veto_threshold")]
    pub veto_threshold: u32,
}

fn default_veto_threshold() -> u32 {
    50
}

impl Default for ChildSection {
    fn default() -> Self {
        Self {
            policy: FanOutPolicy::default(),
            veto_threshold: default_veto_threshold(),
        }
    }
}

/// `[activity]` section: timeouts and retry policy for unit-of-work calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivitySection {
    #[serde(default = "default_start_to_close_timeout_secs")]
    pub start_to_close_timeout_secs: u64,

    /// Timeout used by the paired (CPU-heavy) fan-out.
    #[serde(default = "default_cpu_start_to_close_timeout_secs")]
    pub cpu_start_to_close_timeout_secs: u64,

    /// Total attempts per invocation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Rounds of trigonometry per `simulate()` call.
    #[serde(default = "default_stress_iterations")]
    pub stress_iterations: u32,
}

fn default_start_to_close_timeout_secs() -> u64 {
    60
}

fn default_cpu_start_to_close_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_stress_iterations() -> u32 {
    50
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            start_to_close_timeout_secs: default_start_to_close_timeout_secs(),
            cpu_start_to_close_timeout_secs: default_cpu_start_to_close_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            stress_iterations: default_stress_iterations(),
        }
    }
}

/// `[worker]` section: process-level wiring.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Overridden by `BATCHWINDOW_TASK_QUEUE` when set.
    #[serde(default = "default_task_queue")]
    pub task_queue: String,

    /// Capacity of the unit-of-work pool.
    #[serde(default = "default_max_concurrent_activities")]
    pub max_concurrent_activities: usize,

    /// Port for the status query surface.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_task_queue() -> String {
    "BatchParentWorkflowTaskQueue".to_string()
}

fn default_max_concurrent_activities() -> usize {
    10
}

fn default_metrics_port() -> u16 {
    8087
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            task_queue: default_task_queue(),
            max_concurrent_activities: default_max_concurrent_activities(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// `[source]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourceSection {
    /// Whitespace-separated corpus to paginate. Synthetic record ids are
    /// produced when absent.
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
}
