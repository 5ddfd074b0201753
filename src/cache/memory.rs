//! In-process result store.
//!
//! Nothing is persisted. Useful for tests and for short-lived processes that
//! only want to deduplicate work within one run.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::entry::{CacheEntry, CacheKey};
use crate::cache::store::Store;
use crate::error::{StoreError, StoreResult};

/// Result store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored entry, in no particular order.
    pub fn entries(&self) -> StoreResult<Vec<CacheEntry>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| StoreError::Read("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| StoreError::Write("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn ensure_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<String>> {
        Ok(self.read()?.get(key).map(|entry| entry.value.clone()))
    }

    fn put(&self, entry: &CacheEntry) -> StoreResult<()> {
        self.write()?.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }
}
