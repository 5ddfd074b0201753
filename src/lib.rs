//! Metacache - Persistent Analysis Result Cache
//!
//! Puts a durable cache in front of an expensive, deterministic file
//! analyzer. Results are keyed by file path, size and modification time, and
//! the whole cache is discarded whenever the analyzer's version changes.
//!
//! # Example
//!
//! ```no_run
//! use metacache::analyzer::FnAnalyzer;
//! use metacache::cache::AnalysisCache;
//! use metacache::config::CacheConfig;
//! use std::path::Path;
//!
//! let analyzer = FnAnalyzer::new("line-count-1", |path: &Path| {
//!     std::fs::read_to_string(path).map(|text| text.lines().count())
//! });
//! let cache = AnalysisCache::open_sqlite(&CacheConfig::load(), analyzer).unwrap();
//!
//! let lines = cache.analyze("README.md").unwrap();
//! println!("{} lines", lines);
//! ```

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;

pub use analyzer::{Analyzer, FnAnalyzer};
pub use cache::{Analysis, AnalysisCache, CacheStats, MemoryStore, Served, SqliteStore, Store};
pub use config::{CacheConfig, CorruptEntryPolicy, LockPolicy};
pub use error::{CacheError, CacheResult, StoreError};
