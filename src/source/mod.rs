// src/source/mod.rs

//! Batch source boundary.
//!
//! The orchestrator pulls batches by `(page_size, total_size, offset)`. A
//! source must answer the same triple with the same batch every time, since
//! a lineage may ask again after a restart.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::activity::ActivityError;
use crate::errors::Result;
use crate::types::BoxFuture;

/// Ordered record identifiers. Empty means the source is exhausted.
pub type Batch = Vec<String>;

pub trait BatchSource: Send + Sync {
    fn next_batch(
        &self,
        page_size: u64,
        total_size: u64,
        offset: u64,
    ) -> BoxFuture<'_, std::result::Result<Batch, ActivityError>>;
}

/// Paginates a word corpus, or synthetic `record-<n>` ids when the corpus is
/// empty.
///
/// Record `i` is the `i % len`-th word, so `total_size` may exceed the corpus
/// length.
#[derive(Debug, Clone, Default)]
pub struct CorpusSource {
    words: Arc<Vec<String>>,
}

impl CorpusSource {
    /// A source producing `record-0`, `record-1`, ...
    pub fn synthetic() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let words = text.split_whitespace().map(str::to_string).collect();
        Self {
            words: Arc::new(words),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading corpus {}", path.display()))?;
        let source = Self::from_text(&text);
        debug!(path = %path.display(), words = source.len(), "loaded corpus");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The page at `offset`, synchronously.
    pub fn page(&self, page_size: u64, total_size: u64, offset: u64) -> Batch {
        if offset >= total_size {
            return Vec::new();
        }
        let end = offset.saturating_add(page_size).min(total_size);

        (offset..end)
            .map(|i| {
                if self.words.is_empty() {
                    format!("record-{i}")
                } else {
                    self.words[(i % self.words.len() as u64) as usize].clone()
                }
            })
            .collect()
    }
}

impl BatchSource for CorpusSource {
    fn next_batch(
        &self,
        page_size: u64,
        total_size: u64,
        offset: u64,
    ) -> BoxFuture<'_, std::result::Result<Batch, ActivityError>> {
        Box::pin(async move { Ok(self.page(page_size, total_size, offset)) })
    }
}
