//! Error types and stable error codes.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`]: raised by a [`Store`](crate::cache::Store) adapter.
//! - [`CacheError`]: raised by [`AnalysisCache`](crate::cache::AnalysisCache),
//!   generic over the analyzer's own error type so analyzer failures are
//!   passed through untouched.
//!
//! Only initialization failures and analyzer failures normally reach the
//! caller of `analyze`. Read-path store failures degrade to a cache miss and
//! write-path failures are logged, see [`crate::cache`].

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be opened or reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backing table could not be created.
    #[error("failed to create cache schema: {0}")]
    Schema(String),

    /// A lookup failed.
    #[error("store read failed: {0}")]
    Read(String),

    /// An insert or delete failed.
    #[error("store write failed: {0}")]
    Write(String),
}

/// Result type for storage backends.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by the analysis cache.
///
/// `E` is the analyzer's error type.
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The store could not be reached while initializing.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The backing structure could not be created.
    #[error("cache schema error: {0}")]
    Schema(#[source] StoreError),

    /// A stored record could not be deserialized.
    ///
    /// Only returned under [`CorruptEntryPolicy::Fail`](crate::config::CorruptEntryPolicy::Fail);
    /// the caller may retry with a fresh analysis.
    #[error("corrupt cache entry for {}: {reason}", .path.display())]
    CorruptEntry { path: PathBuf, reason: String },

    /// The analyzer failed. The inner error is the analyzer's own.
    #[error("analyzer failed: {0}")]
    Analyzer(#[source] E),

    /// A write the caller explicitly asked for (such as a clear) failed.
    #[error("cache store write failed: {0}")]
    StoreWrite(#[source] StoreError),
}

/// Result type for cache operations.
pub type CacheResult<T, E> = std::result::Result<T, CacheError<E>>;

impl<E> CacheError<E> {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Schema(_) => ErrorKind::Schema,
            Self::CorruptEntry { .. } => ErrorKind::CorruptEntry,
            Self::Analyzer(_) => ErrorKind::Analyzer,
            Self::StoreWrite(_) => ErrorKind::StoreWrite,
        }
    }

    /// Whether retrying as a fresh analysis can succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CorruptEntry { .. } | Self::StoreWrite(_))
    }

    /// Unwrap the analyzer's own error, if that is what this is.
    pub fn into_analyzer_error(self) -> Option<E> {
        match self {
            Self::Analyzer(e) => Some(e),
            _ => None,
        }
    }
}

/// Coarse classification of [`CacheError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Store could not be reached at initialization.
    StoreUnavailable,
    /// Backing table could not be created.
    Schema,
    /// Stored record failed to deserialize.
    CorruptEntry,
    /// Analyzer failure, passed through.
    Analyzer,
    /// Requested store write failed.
    StoreWrite,
}

impl ErrorKind {
    /// Get the machine-readable error code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::StoreUnavailable => "MC001",
            Self::Schema => "MC002",
            Self::CorruptEntry => "MC003",
            Self::Analyzer => "MC004",
            Self::StoreWrite => "MC005",
        }
    }

    /// Whether initialization cannot proceed after this error.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::Schema)
    }
}

/// Structured error information for machine-readable reporting.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "MC001")
    pub code: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Whether a fresh analysis may succeed
    pub recoverable: bool,
}

impl StructuredError {
    /// Build a structured report from a cache error.
    #[must_use]
    pub fn new<E: std::fmt::Display>(err: &CacheError<E>) -> Self {
        let kind = err.kind();
        Self {
            code: kind.code().to_string(),
            kind,
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}
