use super::support::{write_file, CountingAnalyzer};
use metacache::cache::{AnalysisCache, CacheEntry, CacheKey, MemoryStore, Store};
use metacache::config::CacheConfig;
use tempfile::tempdir;

#[test]
fn test_version_change_discards_entries() {
    let dir = tempdir().unwrap();
    let files: Vec<_> = (0..5)
        .map(|i| write_file(dir.path(), &format!("track_{}.mp3", i), 10 + i, 1, 1000))
        .collect();

    let v1 = AnalysisCache::new(
        MemoryStore::new(),
        CountingAnalyzer::new("1.9.0"),
        &CacheConfig::default(),
    )
    .unwrap();
    for file in &files {
        v1.analyze(file).unwrap();
    }
    assert_eq!(v1.entry_count().unwrap(), 5);

    let store = v1.into_store();
    let v2 = AnalysisCache::new(store, CountingAnalyzer::new("1.9.1"), &CacheConfig::default())
        .unwrap();

    assert_eq!(v2.entry_count().unwrap(), 0);
    assert!(v2
        .store()
        .get(&CacheKey::version_marker("1.9.0"))
        .unwrap()
        .is_none());
    assert_eq!(
        v2.store()
            .get(&CacheKey::version_marker("1.9.1"))
            .unwrap()
            .as_deref(),
        Some("1.9.1")
    );

    for file in &files {
        assert!(!v2.analyze_traced(file).unwrap().is_hit());
    }
    assert_eq!(v2.analyzer().calls(), 5);
}

#[test]
fn test_same_version_keeps_entries() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "a.mp3", 10, 1, 1000);

    let first = AnalysisCache::new(
        MemoryStore::new(),
        CountingAnalyzer::new("v1"),
        &CacheConfig::default(),
    )
    .unwrap();
    first.analyze(&path).unwrap();

    let again = AnalysisCache::new(
        first.into_store(),
        CountingAnalyzer::new("v1"),
        &CacheConfig::default(),
    )
    .unwrap();
    assert_eq!(again.entry_count().unwrap(), 1);
    assert!(again.analyze_traced(&path).unwrap().is_hit());
    assert_eq!(again.analyzer().calls(), 0);
}

#[test]
fn test_downgrade_does_not_resurrect_old_entries() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "a.mp3", 10, 1, 1000);
    let config = CacheConfig::default();

    let v1 = AnalysisCache::new(MemoryStore::new(), CountingAnalyzer::new("v1"), &config).unwrap();
    v1.analyze(&path).unwrap();
    let v2 = AnalysisCache::new(v1.into_store(), CountingAnalyzer::new("v2"), &config).unwrap();
    let back = AnalysisCache::new(v2.into_store(), CountingAnalyzer::new("v1"), &config).unwrap();

    assert!(!back.analyze_traced(&path).unwrap().is_hit());
    assert_eq!(back.store().len().unwrap(), 2);
}

#[test]
fn test_marker_with_wrong_value_resets() {
    let store = MemoryStore::new();
    let mut marker = CacheEntry::version_marker("v1");
    marker.value = "tampered".to_string();
    store.put(&marker).unwrap();
    store
        .put(&CacheEntry::new(
            CacheKey::new("stale.mp3", 1, 1),
            "{}".to_string(),
        ))
        .unwrap();

    let cache =
        AnalysisCache::new(store, CountingAnalyzer::new("v1"), &CacheConfig::default()).unwrap();

    assert_eq!(cache.store().len().unwrap(), 1);
    assert_eq!(
        cache
            .store()
            .get(&CacheKey::version_marker("v1"))
            .unwrap()
            .as_deref(),
        Some("v1")
    );
}

#[test]
fn test_empty_store_gets_marker() {
    let cache = AnalysisCache::new(
        MemoryStore::new(),
        CountingAnalyzer::new("2.0"),
        &CacheConfig::default(),
    )
    .unwrap();
    let entries = cache.store().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].key.is_version_marker());
    assert_eq!(entries[0].value, "2.0");
}

#[test]
fn test_version_change_on_disk() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let config = CacheConfig::default().with_database(cache_dir.path().join("cache.db"));
    let path = write_file(dir.path(), "a.mp3", 10, 1, 1000);

    {
        let cache = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v1")).unwrap();
        cache.analyze(&path).unwrap();
    }

    let cache = AnalysisCache::open_sqlite(&config, CountingAnalyzer::new("v2")).unwrap();
    assert_eq!(cache.entry_count().unwrap(), 0);
    assert!(!cache.analyze_traced(&path).unwrap().is_hit());
}
