//! Cache configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`CacheConfig::default`])
//! 2. A TOML file (`config.toml` in the platform config directory, or an
//!    explicit path)
//! 3. `METACACHE_*` environment variables (e.g. `METACACHE_TABLE=results`)
//!
//! The resulting struct is immutable input to
//! [`AnalysisCache`](crate::cache::AnalysisCache) and
//! [`SqliteStore`](crate::cache::SqliteStore).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default name of the cache table.
pub const DEFAULT_TABLE: &str = "analysis_cache";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "METACACHE_";

const MAX_TABLE_NAME_LEN: usize = 64;

/// How concurrent misses on the same key are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockPolicy {
    /// No coordination. Concurrent misses may each run the analyzer.
    #[default]
    None,
    /// Hold a lock per key across lookup, analysis and insert.
    PerKey,
}

/// What to do when a stored record fails to deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorruptEntryPolicy {
    /// Log it, re-run the analyzer and overwrite the bad entry.
    #[default]
    Recompute,
    /// Return [`CacheError::CorruptEntry`](crate::error::CacheError::CorruptEntry).
    Fail,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path of the SQLite database file.
    pub database: PathBuf,
    /// Name of the table holding cache entries.
    pub table: String,
    /// Concurrency policy for misses.
    pub lock_policy: LockPolicy,
    /// Recovery policy for undecodable entries.
    pub corrupt_entries: CorruptEntryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            table: DEFAULT_TABLE.to_string(),
            lock_policy: LockPolicy::default(),
            corrupt_entries: CorruptEntryPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Load the configuration from the default platform-specific path.
    ///
    /// Falls back to defaults (plus environment overrides) when the file is
    /// missing or invalid, and to plain defaults when the overrides are too.
    pub fn load() -> Self {
        let loaded = Self::config_path().and_then(|path| Self::load_from_path(&path));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {:#}", e);
                Self::figment(None)
                    .extract::<Self>()
                    .ok()
                    .filter(|config| config.validate().is_ok())
                    .unwrap_or_default()
            }
        }
    }

    /// Load configuration from an explicit TOML file, with environment overrides.
    ///
    /// A missing file is not an error; the defaults are used in its place.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config: Self = Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Invalid cache configuration in {}", path.display()))?;
        config.validate()?;
        log::debug!("Loaded cache configuration from {}", path.display());
        Ok(config)
    }

    /// Save the configuration as TOML.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table)?;
        if self.database.as_os_str().is_empty() {
            anyhow::bail!("Cache database path must not be empty");
        }
        Ok(())
    }

    /// Use `path` as the database file.
    #[must_use]
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = path.into();
        self
    }

    /// Use `table` for cache entries.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the concurrency policy.
    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Set the corrupt entry policy.
    #[must_use]
    pub fn with_corrupt_entries(mut self, policy: CorruptEntryPolicy) -> Self {
        self.corrupt_entries = policy;
        self
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Get the default platform-specific configuration path.
    fn config_path() -> Result<PathBuf> {
        let project_dirs = project_dirs()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }
}

/// Reject table names that cannot be used as a bare SQL identifier.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok
        || name.len() > MAX_TABLE_NAME_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!(
            "Invalid cache table name '{}': use letters, digits and '_' (max {} chars, not starting with a digit)",
            name,
            MAX_TABLE_NAME_LEN
        );
    }
    Ok(())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "metacache", "metacache")
}

fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("cache.db"))
        .unwrap_or_else(|| PathBuf::from(".metacache").join("cache.db"))
}
