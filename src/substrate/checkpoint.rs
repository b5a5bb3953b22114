// src/substrate/checkpoint.rs

//! Continuation persistence across checkpoint-and-restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::OrchestrationParams;
use crate::errors::{BatchWindowError, Result};

/// Everything the next lifetime of a lineage starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    /// Lineage id the continuation belongs to.
    pub lineage: String,
    /// 1-based number of the lifetime that *produced* this continuation.
    pub lifetime: u32,
    /// Identities still in flight that the next lifetime should keep
    /// tracking. Always empty under the `abandon` reconcile policy.
    #[serde(default)]
    pub carried: Vec<String>,
    pub params: OrchestrationParams,
}

/// Where continuations are persisted.
///
/// `persist` failing is an unrecoverable substrate error for the lifetime
/// that tried to checkpoint.
pub trait CheckpointStore: Send + Sync {
    fn persist(&self, continuation: &Continuation) -> Result<()>;

    /// The last persisted continuation, if the lineage has not finished.
    fn load(&self) -> Result<Option<Continuation>>;

    /// Forget the continuation once the lineage has run to exhaustion.
    fn clear(&self) -> Result<()>;
}

/// Run a store call on the blocking pool. File-backed stores do synchronous
/// IO, which must stay off the async worker threads.
pub async fn run_blocking<T, F>(store: &Arc<dyn CheckpointStore>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CheckpointStore) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| BatchWindowError::Substrate(format!("checkpoint store task failed: {e}")))?
}

/// Keeps only the latest continuation in memory; each persist replaces the
/// previous one.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    latest: Mutex<Option<Continuation>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn persist(&self, continuation: &Continuation) -> Result<()> {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = Some(continuation.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Continuation>> {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        Ok(latest.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = None;
        Ok(())
    }
}

/// Persists the latest continuation as a TOML file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous continuation intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn persist(&self, continuation: &Continuation) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string(continuation)?;
        let tmp = self.temp_path();
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            offset = continuation.params.offset,
            lifetime = continuation.lifetime,
            "persisted continuation"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<Continuation>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let continuation: Continuation = toml::from_str(&contents)?;
        debug!(
            path = %self.path.display(),
            offset = continuation.params.offset,
            "loaded continuation"
        );
        Ok(Some(continuation))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BatchWindowError::IoError(e)),
        }
    }
}
