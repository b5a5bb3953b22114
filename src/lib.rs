// src/lib.rs

pub mod activity;
pub mod child;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod source;
pub mod status_server;
pub mod substrate;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::activity::{CorpusActivities, Invoker, RetryPolicy, WorkerPool};
use crate::child::{BatchController, ControllerLauncher};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::{CoreLimits, Lineage, OrchestrationParams, SubProcessStatus};
use crate::errors::Result;
use crate::source::CorpusSource;
use crate::substrate::{
    CheckpointStore, DeterministicRandom, FileCheckpointStore, LineageId, MemoryCheckpointStore,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - batch source, unit of work and worker pool
/// - sub-process controller and launcher
/// - checkpoint store and lineage driver
/// - the status server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = apply_cli_overrides(load_and_validate(&args.config)?, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let source = Arc::new(match cfg.source.corpus_path {
        Some(ref path) => CorpusSource::from_path(path)?,
        None => CorpusSource::synthetic(),
    });

    // One pool bounds every unit-of-work invocation, batch fetches included.
    let pool = WorkerPool::new(cfg.worker.max_concurrent_activities);
    let fetcher = Invoker::new(pool.clone(), RetryPolicy::from_config(&cfg.activity));

    let work = Arc::new(CorpusActivities::new(cfg.activity.stress_iterations));
    let controller = BatchController::from_config(&cfg, work, pool, DeterministicRandom::live());
    let launcher = Arc::new(ControllerLauncher::new(controller));

    let store: Arc<dyn CheckpointStore> = match cfg.orchestrator.checkpoint_path {
        Some(ref path) => Arc::new(FileCheckpointStore::new(path)),
        None => Arc::new(MemoryCheckpointStore::new()),
    };

    let lineage = Lineage::new(
        LineageId::new(cfg.orchestrator.workflow_id.clone()),
        CoreLimits::from_config(&cfg.orchestrator),
        source,
        launcher,
        store,
        fetcher,
    );
    let status = lineage.status_handle();

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.worker.metrics_port));
    let server = match status_server::spawn_status_server(addr, status.clone()).await {
        Ok((_, handle)) => Some(handle),
        Err(e) => {
            warn!(%addr, error = %e, "status server unavailable; continuing without it");
            None
        }
    };

    let initial = OrchestrationParams {
        offset: cfg.orchestrator.offset,
        batch_size: cfg.orchestrator.batch_size,
        total_records: cfg.orchestrator.total_records,
    };
    let (params, lifetime) = lineage.starting_params(initial, args.resume)?;

    info!(
        lineage = %cfg.orchestrator.workflow_id,
        task_queue = %cfg.worker.task_queue,
        pool = cfg.worker.max_concurrent_activities,
        policy = ?cfg.child.policy,
        offset = params.offset,
        "batchwindow started"
    );

    let outcome = tokio::select! {
        res = lineage.run(params, lifetime) => Some(res?),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("interrupted; stopping without draining");
            None
        }
    };

    let snapshot = match outcome {
        Some(ref report) => report.status.clone(),
        None => status.get_status(),
    };
    info!(
        lifetimes = outcome.as_ref().map(|r| r.lifetimes),
        completed = snapshot.count(SubProcessStatus::Completed),
        failed = snapshot.count(SubProcessStatus::Failed),
        running = snapshot.count(SubProcessStatus::Running),
        "final status"
    );

    if let Some(handle) = server {
        handle.abort();
    }
    Ok(())
}

/// Fold CLI flags into the loaded config and validate the result again.
fn apply_cli_overrides(cfg: ConfigFile, args: &CliArgs) -> Result<ConfigFile> {
    let mut raw = cfg.into_raw();
    if let Some(offset) = args.offset {
        raw.orchestrator.offset = offset;
    }
    if let Some(total) = args.total_records {
        raw.orchestrator.total_records = total;
    }
    if let Some(policy) = args.policy {
        raw.child.policy = policy;
    }
    if let Some(port) = args.metrics_port {
        raw.worker.metrics_port = port;
    }
    ConfigFile::try_from(raw)
}

/// Print the resolved configuration.
fn print_dry_run(cfg: &ConfigFile) {
    let o = &cfg.orchestrator;
    println!("batchwindow dry-run");
    println!("  orchestrator.workflow_id = {}", o.workflow_id);
    println!("  orchestrator.offset = {}", o.offset);
    println!("  orchestrator.batch_size = {}", o.batch_size);
    println!("  orchestrator.window_size = {}", o.window_size);
    println!(
        "  orchestrator.continue_as_new_threshold = {}",
        o.continue_as_new_threshold
    );
    println!("  orchestrator.total_records = {}", o.total_records);
    println!("  orchestrator.reconcile = {:?}", o.reconcile);
    match o.checkpoint_path {
        Some(ref path) => println!("  orchestrator.checkpoint_path = {}", path.display()),
        None => println!("  orchestrator.checkpoint_path = (memory)"),
    }
    println!();

    println!("  child.policy = {:?}", cfg.child.policy);
    println!("  child.veto_threshold = {}", cfg.child.veto_threshold);
    println!(
        "  activity.start_to_close_timeout_secs = {}",
        cfg.activity.start_to_close_timeout_secs
    );
    println!(
        "  activity.cpu_start_to_close_timeout_secs = {}",
        cfg.activity.cpu_start_to_close_timeout_secs
    );
    println!("  activity.max_attempts = {}", cfg.activity.max_attempts);
    println!("  worker.task_queue = {}", cfg.worker.task_queue);
    println!(
        "  worker.max_concurrent_activities = {}",
        cfg.worker.max_concurrent_activities
    );
    println!("  worker.metrics_port = {}", cfg.worker.metrics_port);
    if let Some(ref path) = cfg.source.corpus_path {
        println!("  source.corpus_path = {}", path.display());
    }

    let batches = o.total_records.saturating_sub(o.offset).div_ceil(o.batch_size);
    println!();
    println!("  batches to launch: {batches}");
}
