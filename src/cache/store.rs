//! The storage seam between the cache and its backend.

use std::sync::Arc;

use crate::cache::entry::{CacheEntry, CacheKey};
use crate::error::StoreResult;

/// Durable exact-match mapping from [`CacheKey`] to serialized records.
///
/// Implementations own their connection handling. The cache only ever calls
/// these methods and never builds query text itself.
pub trait Store {
    /// Create the backing table or namespace if it does not exist.
    fn ensure_schema(&self) -> StoreResult<()>;

    /// Look up the stored value for an exact key.
    fn get(&self, key: &CacheKey) -> StoreResult<Option<String>>;

    /// Write an entry, replacing any existing entry with the same key.
    fn put(&self, entry: &CacheEntry) -> StoreResult<()>;

    /// Remove every entry, version marker included.
    fn delete_all(&self) -> StoreResult<()>;

    /// Number of stored rows, version marker included.
    fn len(&self) -> StoreResult<usize>;

    /// Whether the store holds no rows at all.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn ensure_schema(&self) -> StoreResult<()> {
        (**self).ensure_schema()
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, entry: &CacheEntry) -> StoreResult<()> {
        (**self).put(entry)
    }

    fn delete_all(&self) -> StoreResult<()> {
        (**self).delete_all()
    }

    fn len(&self) -> StoreResult<usize> {
        (**self).len()
    }
}
