//! Fragment pool abstraction.
//!
//! A [`FragmentPool`] supplies the candidate fragment set the engine ranks.
//! Narrowing the pool to an entity or topic happens in the provider, before
//! retrieval starts; the engine never fetches or filters on its own.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Fragment;

/// Source of fragments for indexing and retrieval.
///
/// All operations are async (via `async-trait`) so database or network
/// backed pools can sit behind the same interface as the in-memory one.
#[async_trait]
pub trait FragmentPool: Send + Sync {
    /// Fragments in the pool, restricted to `scope` ids when given.
    async fn fragments(&self, scope: Option<&HashSet<String>>) -> Result<Vec<Fragment>>;

    /// Number of fragments currently held.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
