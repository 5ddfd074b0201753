//! The analyzer seam.
//!
//! An [`Analyzer`] is the expensive operation the cache sits in front of. It
//! must be deterministic for a given file version and analyzer version: the
//! cache will return a stored record instead of calling it again for as long
//! as the file's path, size, mtime and the analyzer's [`version`] match.
//!
//! [`version`]: Analyzer::version

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::Path;

/// Produces an analysis record for a file.
pub trait Analyzer {
    /// Output of one analysis. Must satisfy the [`codec`](crate::cache::codec) contract.
    type Record: Serialize + DeserializeOwned;

    /// The analyzer's own failure type, passed to callers unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Analyze the file at `path`.
    fn analyze(&self, path: &Path) -> Result<Self::Record, Self::Error>;

    /// Version of the analysis logic. Changing it discards every cached record.
    fn version(&self) -> &str;
}

/// Adapts a closure into an [`Analyzer`].
///
/// ```
/// use metacache::analyzer::{Analyzer, FnAnalyzer};
/// use std::path::Path;
///
/// let sizer = FnAnalyzer::new("sizes-1", |path: &Path| {
///     std::fs::metadata(path).map(|m| m.len())
/// });
/// assert_eq!(sizer.version(), "sizes-1");
/// ```
pub struct FnAnalyzer<F, R, E> {
    version: String,
    func: F,
    _output: PhantomData<fn() -> Result<R, E>>,
}

impl<F, R, E> FnAnalyzer<F, R, E>
where
    F: Fn(&Path) -> Result<R, E>,
{
    /// Wrap `func`, reporting `version` as the analyzer version.
    pub fn new(version: impl Into<String>, func: F) -> Self {
        Self {
            version: version.into(),
            func,
            _output: PhantomData,
        }
    }
}

impl<F, R, E> std::fmt::Debug for FnAnalyzer<F, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAnalyzer")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<F, R, E> Analyzer for FnAnalyzer<F, R, E>
where
    F: Fn(&Path) -> Result<R, E>,
    R: Serialize + DeserializeOwned,
    E: std::error::Error + Send + Sync + 'static,
{
    type Record = R;
    type Error = E;

    fn analyze(&self, path: &Path) -> Result<R, E> {
        (self.func)(path)
    }

    fn version(&self) -> &str {
        &self.version
    }
}
