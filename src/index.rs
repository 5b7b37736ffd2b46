//! Copy-on-rebuild handle around the lexical index.
//!
//! Readers take an [`Arc`] snapshot and score against it for the whole
//! call; a rebuild constructs a fresh [`LexicalIndex`] off to the side and
//! swaps the pointer in one short write-locked step. A half-built index is
//! never visible, and readers never wait for a build.
//!
//! Rebuilds are serialized by an async writer mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use tracing::info;

use recall_harness_core::lexical::LexicalIndex;
use recall_harness_core::models::Fragment;
use recall_harness_core::pool::FragmentPool;

pub struct IndexHandle {
    current: RwLock<Arc<LexicalIndex>>,
    writer: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl IndexHandle {
    pub fn new(index: LexicalIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            writer: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Build the initial index synchronously.
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = Fragment>,
    {
        Self::new(LexicalIndex::build(fragments))
    }

    /// The index as of now. Holding the snapshot keeps it alive across swaps.
    pub fn snapshot(&self) -> Arc<LexicalIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of completed swaps.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Rebuild from `fragments` and swap it in. Returns the new corpus size.
    pub async fn rebuild(&self, fragments: Vec<Fragment>) -> Result<usize> {
        let _guard = self.writer.lock().await;

        let index = tokio::task::spawn_blocking(move || LexicalIndex::build(fragments))
            .await
            .context("index build task failed")?;
        let size = index.len();

        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = Arc::new(index);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(fragments = size, generation, "lexical index swapped");

        Ok(size)
    }

    /// Pull every fragment from `pool` and rebuild.
    pub async fn refresh_from(&self, pool: &dyn FragmentPool) -> Result<usize> {
        let fragments = pool
            .fragments(None)
            .await
            .context("failed to load fragments from pool")?;
        self.rebuild(fragments).await
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new(LexicalIndex::default())
    }
}
