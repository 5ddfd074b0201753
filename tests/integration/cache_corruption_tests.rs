use super::support::{key_of, write_file, CountingAnalyzer, FlakyStore};
use metacache::cache::{AnalysisCache, CacheEntry, SqliteStore, Store};
use metacache::config::{CacheConfig, CorruptEntryPolicy, LockPolicy};
use metacache::error::{CacheError, ErrorKind, StoreError};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_open_corrupted_database() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path();

    {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(b"not a sqlite database, just some bytes padding it past the header size")
            .unwrap();
    }

    let res = SqliteStore::open(path, "analysis_cache");
    assert!(matches!(res, Err(StoreError::Unavailable(_))));

    let config = CacheConfig::default().with_database(path);
    let err = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.kind().is_fatal());
}

#[test]
fn test_recovery_on_corruption() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(b"corrupted garbage corrupted garbage corrupted garbage corrupted")
            .unwrap();
    }

    let config = CacheConfig::default().with_database(&path);
    let res = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1"));
    assert!(res.is_err());

    fs::remove_file(&path).unwrap();
    let cache = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1"))
        .expect("Should succeed after deleting corrupted file");
    assert!(cache.clear_cache().is_ok());
}

#[test]
fn test_corrupt_row_is_recomputed() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let config = CacheConfig::default().with_database(cache_dir.path().join("cache.db"));
    let cache = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1")).unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    let key = key_of(&path);
    cache
        .store()
        .put(&CacheEntry::new(key.clone(), "a:3:{s:7:\"bitrate\"".to_string()))
        .unwrap();

    let analysis = cache.analyze_traced(&path).unwrap();
    assert!(!analysis.is_hit());
    assert_eq!(analysis.record.size, 20);
    assert_eq!(cache.stats().corrupt_entries, 1);

    // The bad row was replaced by the fresh record.
    let stored = cache.store().get(&key).unwrap().unwrap();
    assert!(stored.starts_with('{'));
    assert!(cache.analyze_traced(&path).unwrap().is_hit());
    assert_eq!(cache.analyzer().calls(), 1);
}

#[test]
fn test_corrupt_row_counted_once_with_per_key_locks() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::default().with_lock_policy(LockPolicy::PerKey);
    let store = SqliteStore::open_in_memory("analysis_cache").unwrap();
    let cache = AnalysisCache::new(store, CountingAnalyzer::new("v1"), &config).unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    cache
        .store()
        .put(&CacheEntry::new(key_of(&path), "{\"bitrate\":".to_string()))
        .unwrap();

    let analysis = cache.analyze_traced(&path).unwrap();
    assert!(!analysis.is_hit());
    assert_eq!(cache.stats().corrupt_entries, 1);
    assert_eq!(cache.stats().misses, 1);
    assert!(cache.analyze_traced(&path).unwrap().is_hit());
}

#[test]
fn test_corrupt_row_fail_policy() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::default().with_corrupt_entries(CorruptEntryPolicy::Fail);
    let store = SqliteStore::open_in_memory("analysis_cache").unwrap();
    let cache = AnalysisCache::new(store, CountingAnalyzer::new("v1"), &config).unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    cache
        .store()
        .put(&CacheEntry::new(key_of(&path), "{\"bitrate\":".to_string()))
        .unwrap();

    let err = cache.analyze(&path).unwrap_err();
    match &err {
        CacheError::CorruptEntry { path: p, .. } => assert_eq!(p, &path),
        other => panic!("Expected CorruptEntry, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::CorruptEntry);
    assert_eq!(cache.analyzer().calls(), 0);

    // Caller-side recovery: drop the bad data and analyze fresh.
    cache.clear_cache().unwrap();
    assert!(!cache.analyze_traced(&path).unwrap().is_hit());
}

#[test]
fn test_lookup_failure_is_a_miss() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let cache = AnalysisCache::new(
        Arc::clone(&store),
        CountingAnalyzer::new("v1"),
        &CacheConfig::default(),
    )
    .unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    cache.analyze(&path).unwrap();

    FlakyStore::set(&store.fail_gets, true);
    let analysis = cache.analyze_traced(&path).unwrap();
    assert!(!analysis.is_hit());
    assert_eq!(cache.stats().lookup_failures, 1);
    assert_eq!(cache.analyzer().calls(), 2);

    FlakyStore::set(&store.fail_gets, false);
    assert!(cache.analyze_traced(&path).unwrap().is_hit());
}

#[test]
fn test_lookup_failure_counted_once_with_per_key_locks() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let config = CacheConfig::default().with_lock_policy(LockPolicy::PerKey);
    let cache = AnalysisCache::new(
        Arc::clone(&store),
        CountingAnalyzer::new("v1"),
        &config,
    )
    .unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    FlakyStore::set(&store.fail_gets, true);
    assert!(!cache.analyze_traced(&path).unwrap().is_hit());
    assert_eq!(cache.stats().lookup_failures, 1);
}

#[test]
fn test_write_failure_still_returns_record() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FlakyStore::new());
    let cache = AnalysisCache::new(
        Arc::clone(&store),
        CountingAnalyzer::new("v1"),
        &CacheConfig::default(),
    )
    .unwrap();

    let path = write_file(dir.path(), "a.mp3", 20, 3, 1000);
    FlakyStore::set(&store.fail_puts, true);

    let record = cache.analyze(&path).unwrap();
    assert_eq!(record.size, 20);
    assert_eq!(cache.stats().write_failures, 1);
    assert_eq!(cache.entry_count().unwrap(), 0);

    // Nothing was stored, so the next call computes again.
    assert!(!cache.analyze_traced(&path).unwrap().is_hit());
    assert_eq!(cache.analyzer().calls(), 2);
}

#[test]
fn test_clear_failure_is_reported() {
    let store = Arc::new(FlakyStore::new());
    let cache = AnalysisCache::new(
        Arc::clone(&store),
        CountingAnalyzer::new("v1"),
        &CacheConfig::default(),
    )
    .unwrap();

    FlakyStore::set(&store.fail_deletes, true);
    let err = cache.clear_cache().unwrap_err();
    assert!(matches!(err, CacheError::StoreWrite(StoreError::Write(_))));
    assert_eq!(err.kind(), ErrorKind::StoreWrite);
}

#[test]
fn test_init_failures_are_fatal() {
    let store = FlakyStore::new();
    FlakyStore::set(&store.fail_schema, true);
    let err = AnalysisCache::new(store, CountingAnalyzer::new("v1"), &CacheConfig::default())
        .unwrap_err();
    assert!(matches!(err, CacheError::Schema(_)));

    let store = FlakyStore::new();
    FlakyStore::set(&store.fail_gets, true);
    let err = AnalysisCache::new(store, CountingAnalyzer::new("v1"), &CacheConfig::default())
        .unwrap_err();
    assert!(matches!(err, CacheError::StoreUnavailable(_)));

    let store = FlakyStore::new();
    FlakyStore::set(&store.fail_puts, true);
    let err = AnalysisCache::new(store, CountingAnalyzer::new("v1"), &CacheConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

#[test]
fn test_invalid_table_name_is_schema_error() {
    let cache_dir = tempdir().unwrap();
    let config = CacheConfig::default()
        .with_database(cache_dir.path().join("cache.db"))
        .with_table("drop table; --");
    let err = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}
