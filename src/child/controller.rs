// src/child/controller.rs

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::activity::{Invoker, RetryPolicy, UnitOfWork, WorkerPool};
use crate::child::ChildError;
use crate::config::ConfigFile;
use crate::source::Batch;
use crate::substrate::DeterministicRandom;
use crate::types::FanOutPolicy;

type ItemSet = JoinSet<Result<(), ChildError>>;

/// Which unit-of-work path a record goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessPath {
    Primary,
    Alt,
}

impl ProcessPath {
    fn label(self) -> &'static str {
        match self {
            ProcessPath::Primary => "process",
            ProcessPath::Alt => "process_alt",
        }
    }
}

/// Processes one batch per call. Holds no per-batch state, so one controller
/// serves every sub-process of a worker.
#[derive(Clone)]
pub struct BatchController {
    policy: FanOutPolicy,
    veto_threshold: u32,
    work: Arc<dyn UnitOfWork>,
    light: Invoker,
    cpu: Invoker,
    random: DeterministicRandom,
}

impl fmt::Debug for BatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchController")
            .field("policy", &self.policy)
            .field("veto_threshold", &self.veto_threshold)
            .field("light", &self.light)
            .field("cpu", &self.cpu)
            .finish_non_exhaustive()
    }
}

impl BatchController {
    /// Uniform fan-out with a veto threshold of 50 and default retry policies.
    pub fn new(work: Arc<dyn UnitOfWork>, pool: WorkerPool, random: DeterministicRandom) -> Self {
        let light = Invoker::new(pool, RetryPolicy::default());
        let cpu = light.with_policy(RetryPolicy {
            start_to_close_timeout: std::time::Duration::from_secs(300),
            ..RetryPolicy::default()
        });
        Self {
            policy: FanOutPolicy::Uniform,
            veto_threshold: 50,
            work,
            light,
            cpu,
            random,
        }
    }

    /// Build from the `[child]` and `[activity]` sections.
    pub fn from_config(
        cfg: &ConfigFile,
        work: Arc<dyn UnitOfWork>,
        pool: WorkerPool,
        random: DeterministicRandom,
    ) -> Self {
        let light = Invoker::new(pool, RetryPolicy::from_config(&cfg.activity));
        let cpu = light.with_policy(RetryPolicy::cpu_from_config(&cfg.activity));
        Self {
            policy: cfg.child.policy,
            veto_threshold: cfg.child.veto_threshold,
            work,
            light,
            cpu,
            random,
        }
    }

    pub fn with_policy(mut self, policy: FanOutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_veto_threshold(mut self, threshold: u32) -> Self {
        self.veto_threshold = threshold;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.light = self.light.with_policy(policy.clone());
        self.cpu = self.cpu.with_policy(policy);
        self
    }

    pub fn policy(&self) -> FanOutPolicy {
        self.policy
    }

    /// Run `batch` to completion as sub-process `child_id`.
    pub async fn process_batch(&self, child_id: &str, batch: Batch) -> Result<(), ChildError> {
        debug!(child_id, records = batch.len(), policy = ?self.policy, "processing batch");

        let result = match self.policy {
            FanOutPolicy::Uniform => self.uniform(child_id, batch).await,
            FanOutPolicy::Partitioned => self.partitioned(batch).await,
            FanOutPolicy::Paired => self.paired(batch).await,
        };

        match &result {
            Ok(()) => info!(child_id, "batch processed"),
            Err(err) => warn!(child_id, error = %err, "batch failed"),
        }
        result
    }

    async fn uniform(&self, child_id: &str, batch: Batch) -> Result<(), ChildError> {
        let mut items = ItemSet::new();
        for record in batch {
            self.spawn_process(&mut items, &self.light, record, ProcessPath::Primary);
        }
        drain(items).await?;

        self.veto_check(child_id)
    }

    async fn partitioned(&self, mut batch: Batch) -> Result<(), ChildError> {
        let second_half = batch.split_off(batch.len() / 2);
        debug!(
            first = batch.len(),
            second = second_half.len(),
            "partitioning batch"
        );

        let mut first = ItemSet::new();
        for record in batch {
            self.spawn_process(&mut first, &self.light, record, ProcessPath::Primary);
        }
        let mut second = ItemSet::new();
        for record in second_half {
            self.spawn_process(&mut second, &self.light, record, ProcessPath::Alt);
        }

        let (first, second) = tokio::join!(drain(first), drain(second));
        first.and(second)
    }

    async fn paired(&self, batch: Batch) -> Result<(), ChildError> {
        let mut records = ItemSet::new();
        let mut load = ItemSet::new();
        for record in batch {
            self.spawn_simulate(&mut load, &self.cpu, record.clone());
            self.spawn_process(&mut records, &self.cpu, record, ProcessPath::Primary);
        }

        let (records, load) = tokio::join!(drain(records), drain(load));
        records.and(load)
    }

    /// Drop everything recorded for `child_id`. Call once the sub-process
    /// has resolved and can no longer be replayed.
    pub fn release(&self, child_id: &str) {
        self.random.forget(&veto_key(child_id));
    }

    /// Batch-level post-condition. The roll is recorded under the child id,
    /// so a replay of the same sub-process reaches the same verdict.
    fn veto_check(&self, child_id: &str) -> Result<(), ChildError> {
        if self.veto_threshold == 0 {
            return Ok(());
        }

        let roll = self.random.percent(&veto_key(child_id));
        if roll < self.veto_threshold {
            warn!(child_id, roll, threshold = self.veto_threshold, "batch vetoed");
            return Err(ChildError::Vetoed {
                child_id: child_id.to_string(),
                roll,
            });
        }
        Ok(())
    }

    fn spawn_process(
        &self,
        items: &mut ItemSet,
        invoker: &Invoker,
        record: String,
        path: ProcessPath,
    ) {
        let work = Arc::clone(&self.work);
        let invoker = invoker.clone();

        items.spawn(async move {
            let result = invoker
                .invoke(path.label(), || {
                    let work = Arc::clone(&work);
                    let record = record.clone();
                    async move {
                        match path {
                            ProcessPath::Primary => work.process(record).await,
                            ProcessPath::Alt => work.process_alt(record).await,
                        }
                    }
                })
                .await;
            result
                .map(|_| ())
                .map_err(|source| ChildError::ItemFailed { record, source })
        });
    }

    fn spawn_simulate(&self, items: &mut ItemSet, invoker: &Invoker, record: String) {
        let work = Arc::clone(&self.work);
        let invoker = invoker.clone();

        items.spawn(async move {
            let result = invoker
                .invoke("simulate", || {
                    let work = Arc::clone(&work);
                    async move { work.simulate().await }
                })
                .await;
            result.map_err(|source| ChildError::ItemFailed { record, source })
        });
    }
}

fn veto_key(child_id: &str) -> String {
    format!("{child_id}/veto")
}

/// Wait for every item; on the first failure abort the rest and report it.
async fn drain(mut items: ItemSet) -> Result<(), ChildError> {
    while let Some(joined) = items.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(ChildError::Panicked(e.to_string())));
        if let Err(err) = outcome {
            items.shutdown().await;
            return Err(err);
        }
    }
    Ok(())
}
