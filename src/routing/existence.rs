//! Cached view of which collections exist in the vector store

use crate::providers::{StoreError, VectorStore};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Collection names listed from the store, refreshed after `ttl`
#[derive(Debug)]
pub struct ExistenceCache {
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, HashSet<String>)>>,
}

impl ExistenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    fn fresh_snapshot(&self) -> Option<HashSet<String>> {
        let guard = self.snapshot.lock().ok()?;
        match guard.as_ref() {
            Some((at, names)) if at.elapsed() < self.ttl => Some(names.clone()),
            _ => None,
        }
    }

    /// Existing collection names, listing the store when the snapshot is stale
    pub async fn existing(&self, store: &dyn VectorStore) -> Result<HashSet<String>, StoreError> {
        if let Some(names) = self.fresh_snapshot() {
            return Ok(names);
        }

        let names: HashSet<String> = store.list_collections().await?.into_iter().collect();
        debug!("Refreshed collection existence cache: {} collections", names.len());

        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = Some((Instant::now(), names.clone()));
        }
        Ok(names)
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh_snapshot().is_some()
    }

    /// Force the next lookup to list the store again
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = None;
        }
    }
}

impl Default for ExistenceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
