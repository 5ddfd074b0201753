//! Persistent analysis result cache.
//!
//! [`AnalysisCache`] wraps an [`Analyzer`] and a [`Store`]. Asking it to
//! analyze a file either returns the record stored for that file or runs
//! the analyzer, stores the record and returns it.
//!
//! # Architecture
//!
//! * [`entry`]: keys, rows and the version marker.
//! * [`store`]: the [`Store`] trait the cache talks to.
//! * [`database`]: SQLite-backed [`Store`].
//! * [`memory`]: in-process [`Store`].
//! * [`codec`]: how records are turned into stored text.
//!
//! # Cache Invalidation
//!
//! Entries are keyed by:
//! * File path, exactly as given
//! * File size
//! * Modification time (whole seconds)
//!
//! A change to any of these makes the next analysis a miss. Content is never
//! hashed, so an edit that preserves size and lands in the same second goes
//! unnoticed.
//!
//! Separately, the store holds one version marker row naming the analyzer
//! version it was built with. Opening a cache with a different analyzer
//! version empties the store.
//!
//! # Failure Handling
//!
//! * Store read failures are logged and treated as misses.
//! * Undecodable rows follow [`CorruptEntryPolicy`].
//! * Failures writing a fresh record back are logged; the record is still
//!   returned.
//! * Analyzer failures are returned unchanged in [`CacheError::Analyzer`].

pub mod codec;
pub mod database;
pub mod entry;
mod locks;
pub mod memory;
pub mod store;

pub use database::SqliteStore;
pub use entry::{CacheEntry, CacheKey};
pub use memory::MemoryStore;
pub use store::Store;

pub use crate::error::{CacheError, CacheResult, StoreError};

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::analyzer::Analyzer;
use crate::config::{CacheConfig, CorruptEntryPolicy, LockPolicy};
use locks::KeyLocks;

/// Where a returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Served {
    /// Decoded from a stored entry.
    Cache,
    /// Computed by the analyzer during this call.
    Fresh,
}

/// A record together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis<R> {
    /// The analysis record
    pub record: R,
    /// Whether it was a hit or freshly computed
    pub served: Served,
}

impl<R> Analysis<R> {
    fn cached(record: R) -> Self {
        Self {
            record,
            served: Served::Cache,
        }
    }

    fn fresh(record: R) -> Self {
        Self {
            record,
            served: Served::Fresh,
        }
    }

    /// Whether the record came from the store.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.served == Served::Cache
    }
}

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Records served from the store
    pub hits: u64,
    /// Lookups that ran the analyzer
    pub misses: u64,
    /// Calls for files that could not be stat'ed, passed straight through
    pub bypassed: u64,
    /// Stored rows that failed to decode
    pub corrupt_entries: u64,
    /// Store lookups that failed and were treated as misses
    pub lookup_failures: u64,
    /// Fresh records that could not be written back
    pub write_failures: u64,
}

impl CacheStats {
    /// Fraction of cacheable lookups served from the store.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    corrupt_entries: AtomicU64,
    lookup_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Result cache in front of an [`Analyzer`].
///
/// The cache owns both its store and its analyzer. Methods take `&self`, so
/// a cache can be shared across threads when `S` and `A` allow it; see
/// [`LockPolicy`] for what happens when two threads miss on the same key.
pub struct AnalysisCache<S: Store, A: Analyzer> {
    store: S,
    analyzer: A,
    version: String,
    lock_policy: LockPolicy,
    corrupt_entries: CorruptEntryPolicy,
    locks: KeyLocks,
    counters: Counters,
}

impl<S: Store, A: Analyzer> std::fmt::Debug for AnalysisCache<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("version", &self.version)
            .field("lock_policy", &self.lock_policy)
            .field("corrupt_entries", &self.corrupt_entries)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl<A: Analyzer> AnalysisCache<SqliteStore, A> {
    /// Open the SQLite store described by `config` and initialize a cache on it.
    pub fn open_sqlite(config: &CacheConfig, analyzer: A) -> CacheResult<Self, A::Error> {
        let store = SqliteStore::from_config(config).map_err(|e| match e {
            StoreError::Schema(_) => CacheError::Schema(e),
            other => CacheError::StoreUnavailable(other),
        })?;
        Self::new(store, analyzer, config)
    }
}

impl<S: Store, A: Analyzer> AnalysisCache<S, A> {
    /// Initialize a cache over `store`.
    ///
    /// Creates the backing table if needed, then reconciles the stored
    /// version marker with `analyzer.version()`, emptying the store when they
    /// differ. Only the policy fields of `config` are used here.
    pub fn new(store: S, analyzer: A, config: &CacheConfig) -> CacheResult<Self, A::Error> {
        store.ensure_schema().map_err(CacheError::Schema)?;

        let cache = Self {
            version: analyzer.version().to_string(),
            store,
            analyzer,
            lock_policy: config.lock_policy,
            corrupt_entries: config.corrupt_entries,
            locks: KeyLocks::default(),
            counters: Counters::default(),
        };
        cache.reconcile_version()?;
        Ok(cache)
    }

    fn reconcile_version(&self) -> CacheResult<(), A::Error> {
        let marker = self
            .store
            .get(&CacheKey::version_marker(&self.version))
            .map_err(CacheError::StoreUnavailable)?;

        if marker.as_deref() == Some(self.version.as_str()) {
            log::debug!("Result cache matches analyzer version {}", self.version);
            return Ok(());
        }

        log::info!(
            "Analyzer version changed to {}, discarding cached results",
            self.version
        );
        self.reset().map_err(CacheError::StoreUnavailable)
    }

    fn reset(&self) -> Result<(), StoreError> {
        self.store.delete_all()?;
        self.store.put(&CacheEntry::version_marker(&self.version))
    }

    /// Analyze `path`, serving a stored record when one matches.
    pub fn analyze(&self, path: impl AsRef<Path>) -> CacheResult<A::Record, A::Error> {
        self.analyze_traced(path).map(|analysis| analysis.record)
    }

    /// Like [`analyze`](Self::analyze), also reporting whether the record
    /// was a hit.
    pub fn analyze_traced(
        &self,
        path: impl AsRef<Path>,
    ) -> CacheResult<Analysis<A::Record>, A::Error> {
        let path = path.as_ref();

        let key = match fs::metadata(path) {
            Ok(metadata) => CacheKey::for_file(path, &metadata),
            Err(_) => None,
        };
        let Some(key) = key else {
            // Nothing to key on; let the analyzer report the problem.
            Counters::bump(&self.counters.bypassed);
            log::trace!("Bypassing cache for {}", path.display());
            let record = self.analyzer.analyze(path).map_err(CacheError::Analyzer)?;
            return Ok(Analysis::fresh(record));
        };

        // Under per-key locking this is only a fast path; faults are
        // recorded by the lookup taken under the lock.
        let tentative = self.lock_policy == LockPolicy::PerKey;
        if let Some(record) = self.lookup(path, &key, tentative)? {
            return Ok(Analysis::cached(record));
        }

        match self.lock_policy {
            LockPolicy::None => self.compute(path, key),
            LockPolicy::PerKey => self.locks.with_lock(&key, || -> CacheResult<_, A::Error> {
                // Another caller may have filled the slot while we waited.
                if let Some(record) = self.lookup(path, &key, false)? {
                    return Ok(Analysis::cached(record));
                }
                self.compute(path, key.clone())
            }),
        }
    }

    /// Look `key` up and decode it.
    ///
    /// A `tentative` lookup is followed by another one, so it treats read
    /// failures and recomputable corrupt rows as a silent miss.
    fn lookup(
        &self,
        path: &Path,
        key: &CacheKey,
        tentative: bool,
    ) -> CacheResult<Option<A::Record>, A::Error> {
        let value = match self.store.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::trace!("Cache miss: {}", path.display());
                return Ok(None);
            }
            Err(_) if tentative => return Ok(None),
            Err(e) => {
                Counters::bump(&self.counters.lookup_failures);
                log::warn!("Failed to query cache for {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        match codec::decode(&value) {
            Ok(record) => {
                Counters::bump(&self.counters.hits);
                log::trace!("Cache hit: {}", path.display());
                Ok(Some(record))
            }
            Err(_) if tentative && self.corrupt_entries == CorruptEntryPolicy::Recompute => {
                Ok(None)
            }
            Err(e) => {
                Counters::bump(&self.counters.corrupt_entries);
                match self.corrupt_entries {
                    CorruptEntryPolicy::Recompute => {
                        log::warn!(
                            "Discarding corrupt cache entry for {}: {}",
                            path.display(),
                            e
                        );
                        Ok(None)
                    }
                    CorruptEntryPolicy::Fail => Err(CacheError::CorruptEntry {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    fn compute(&self, path: &Path, key: CacheKey) -> CacheResult<Analysis<A::Record>, A::Error> {
        Counters::bump(&self.counters.misses);
        let record = self.analyzer.analyze(path).map_err(CacheError::Analyzer)?;

        if path.exists() {
            self.write_back(path, key, &record);
        } else {
            log::debug!("{} vanished during analysis, not caching", path.display());
        }
        Ok(Analysis::fresh(record))
    }

    fn write_back(&self, path: &Path, key: CacheKey, record: &A::Record) {
        let value = match codec::encode(record) {
            Ok(value) => value,
            Err(e) => {
                Counters::bump(&self.counters.write_failures);
                log::warn!("Failed to serialize analysis of {}: {}", path.display(), e);
                return;
            }
        };

        if let Err(e) = self.store.put(&CacheEntry::new(key, value)) {
            Counters::bump(&self.counters.write_failures);
            log::warn!("Failed to update cache for {}: {}", path.display(), e);
        }
    }

    /// Delete every cached record and rewrite the version marker.
    pub fn clear_cache(&self) -> CacheResult<(), A::Error> {
        self.reset().map_err(CacheError::StoreWrite)?;
        log::debug!("Cleared result cache");
        Ok(())
    }

    /// Number of cached records, not counting the version marker.
    pub fn entry_count(&self) -> Result<usize, StoreError> {
        Ok(self.store.len()?.saturating_sub(1))
    }

    /// Counters since this cache was created.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// The analyzer version this cache was initialized with.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Borrow the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Borrow the wrapped analyzer.
    #[must_use]
    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Tear the cache down, returning its store.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }
}
