//! In-memory [`FragmentPool`] for tests and embedded use.
//!
//! Fragments are kept in insertion order behind `std::sync::RwLock`.
//! Inserts are deduplicated by content id; the first copy of a fragment wins.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Fragment;

use super::FragmentPool;

#[derive(Default)]
struct Inner {
    fragments: Vec<Fragment>,
    by_id: HashMap<String, usize>,
}

/// In-memory fragment pool.
#[derive(Default)]
pub struct InMemoryPool {
    inner: RwLock<Inner>,
}

impl InMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from fragments, deduplicating by id.
    pub fn with_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = Fragment>,
    {
        let pool = Self::new();
        pool.extend(fragments);
        pool
    }

    /// Insert a fragment. Returns `false` if its id was already present.
    pub fn insert(&self, fragment: Fragment) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_id.contains_key(&fragment.id) {
            return false;
        }
        let pos = inner.fragments.len();
        inner.by_id.insert(fragment.id.clone(), pos);
        inner.fragments.push(fragment);
        true
    }

    /// Insert many fragments; returns how many were new.
    pub fn extend<I>(&self, fragments: I) -> usize
    where
        I: IntoIterator<Item = Fragment>,
    {
        fragments
            .into_iter()
            .map(|f| self.insert(f))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Remove a fragment by id. Returns `true` if it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = inner.by_id.remove(id) else {
            return false;
        };
        inner.fragments.remove(pos);
        let Inner { fragments, by_id } = &mut *inner;
        for (i, f) in fragments.iter().enumerate().skip(pos) {
            by_id.insert(f.id.clone(), i);
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .contains_key(id)
    }
}

#[async_trait]
impl FragmentPool for InMemoryPool {
    async fn fragments(&self, scope: Option<&HashSet<String>>) -> Result<Vec<Fragment>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .fragments
            .iter()
            .filter(|f| scope.is_none_or(|s| s.contains(&f.id)))
            .cloned()
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fragments
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_dedups_by_content_id() {
        let pool = InMemoryPool::new();
        assert!(pool.insert(Fragment::new("Rust is fast", "mem://a", "v1")));
        assert!(!pool.insert(Fragment::new("  rust   IS fast ", "mem://a", "v1")));
        assert!(pool.insert(Fragment::new("Rust is fast", "mem://b", "v1")));
        assert_eq!(pool.len().await.unwrap(), 2);
        let all = pool.fragments(None).await.unwrap();
        assert_eq!(all[0].text, "Rust is fast");
    }

    #[tokio::test]
    async fn test_scope_filters() {
        let a = Fragment::new("alpha", "mem://a", "v1");
        let b = Fragment::new("beta", "mem://b", "v1");
        let pool = InMemoryPool::with_fragments(vec![a.clone(), b]);
        let scope: HashSet<String> = [a.id.clone()].into_iter().collect();
        let scoped = pool.fragments(Some(&scope)).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, a.id);
    }

    #[tokio::test]
    async fn test_remove_keeps_positions_consistent() {
        let frags: Vec<Fragment> = ["one", "two", "three"]
            .iter()
            .map(|t| Fragment::new(*t, "mem://x", "v1"))
            .collect();
        let pool = InMemoryPool::with_fragments(frags.clone());
        assert!(pool.remove(&frags[0].id));
        assert!(!pool.remove(&frags[0].id));
        assert!(pool.contains(&frags[2].id));
        assert!(pool.remove(&frags[2].id));
        assert_eq!(pool.len().await.unwrap(), 1);
        assert!(!pool.is_empty().await.unwrap());
    }
}
