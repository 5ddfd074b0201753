//! Cache entry definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::Path;

/// Size and mtime value used by the version marker row.
pub const MARKER_SENTINEL: i64 = -1;

/// Identity of a cached analysis: the file's path, size and mtime.
///
/// Content is never looked at. Two files that agree on all three fields are
/// the same input as far as the cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Path exactly as handed to the cache
    pub path: String,
    /// File size in bytes
    pub size: i64,
    /// Modification time in unix seconds
    pub modified: i64,
}

impl CacheKey {
    /// Create a key from raw parts.
    #[must_use]
    pub fn new(path: impl Into<String>, size: i64, modified: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// Build the key for a file from its current metadata.
    ///
    /// Returns `None` when the platform cannot report a modification time,
    /// or when the path is not valid UTF-8 and so has no exact text form.
    #[must_use]
    pub fn for_file(path: &Path, metadata: &Metadata) -> Option<Self> {
        let name = path.to_str()?;
        let modified = metadata.modified().ok()?;
        let modified = DateTime::<Utc>::from(modified).timestamp();
        let size = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        Some(Self::new(name, size, modified))
    }

    /// Key of the version marker for `version`.
    #[must_use]
    pub fn version_marker(version: &str) -> Self {
        Self::new(version, MARKER_SENTINEL, MARKER_SENTINEL)
    }

    /// Whether this is a version marker key.
    ///
    /// Real files never report a negative size.
    #[must_use]
    pub fn is_version_marker(&self) -> bool {
        self.size == MARKER_SENTINEL && self.modified == MARKER_SENTINEL
    }
}

/// A single stored row: key, analysis time and serialized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identity of the analyzed file
    pub key: CacheKey,
    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
    /// Serialized analysis record
    pub value: String,
}

impl CacheEntry {
    /// Create an entry analyzed now.
    #[must_use]
    pub fn new(key: CacheKey, value: String) -> Self {
        Self {
            key,
            analyzed_at: Utc::now(),
            value,
        }
    }

    /// The sentinel entry recording which analyzer version built the cache.
    #[must_use]
    pub fn version_marker(version: &str) -> Self {
        Self {
            key: CacheKey::version_marker(version),
            analyzed_at: DateTime::<Utc>::from_timestamp(MARKER_SENTINEL, 0).unwrap_or_default(),
            value: version.to_string(),
        }
    }
}
