//! SQLite-backed result store.
//!
//! One table holds every entry:
//!
//! | column        | type    | meaning                         |
//! |---------------|---------|---------------------------------|
//! | `filename`    | TEXT    | path as given to the cache      |
//! | `filesize`    | INTEGER | size in bytes, -1 for marker    |
//! | `filetime`    | INTEGER | mtime in unix seconds           |
//! | `analyzetime` | INTEGER | when the record was computed    |
//! | `value`       | TEXT    | serialized analysis record      |
//!
//! The primary key is `(filename, filesize, filetime)`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::entry::{CacheEntry, CacheKey};
use crate::cache::store::Store;
use crate::config::{validate_table_name, CacheConfig};
use crate::error::{StoreError, StoreResult};

/// Persistent store for analysis results using SQLite.
///
/// The connection is shared behind a mutex so the store can sit inside a
/// cache used from several threads.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("conn", &"<connection>")
            .field("table", &self.table)
            .finish()
    }
}

impl SqliteStore {
    /// Opens or creates a database file at `path` using `table`.
    ///
    /// Missing parent directories are created. A file that is not an SQLite
    /// database fails here rather than on first use.
    pub fn open(path: &Path, table: &str) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create cache directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open '{}': {}", path.display(), e))
        })?;
        log::debug!("Opened result store at {}", path.display());
        Self::with_connection(conn, table)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(table: &str) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory store: {}", e)))?;
        Self::with_connection(conn, table)
    }

    /// Opens the store described by `config`.
    pub fn from_config(config: &CacheConfig) -> StoreResult<Self> {
        Self::open(&config.database, &config.table)
    }

    fn with_connection(conn: Connection, table: &str) -> StoreResult<Self> {
        validate_table_name(table).map_err(|e| StoreError::Schema(e.to_string()))?;

        // Forces SQLite to read the header so garbage files are rejected now.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Unavailable(format!("not a usable database: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Name of the backing table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fetch the complete row for `key`, including its analysis time.
    pub fn entry(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT analyzetime, value FROM \"{}\" \
             WHERE filename = ?1 AND filesize = ?2 AND filetime = ?3",
            self.table
        );
        let row = conn
            .query_row(&sql, params![key.path, key.size, key.modified], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .map_err(|e| StoreError::Read(e.to_string()))?;

        Ok(row.map(|(analyzed_at, value)| CacheEntry {
            key: key.clone(),
            analyzed_at: DateTime::<Utc>::from_timestamp(analyzed_at, 0).unwrap_or_default(),
            value,
        }))
    }

    fn connection(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                filename    TEXT    NOT NULL DEFAULT '',
                filesize    INTEGER NOT NULL DEFAULT 0,
                filetime    INTEGER NOT NULL DEFAULT 0,
                analyzetime INTEGER NOT NULL DEFAULT 0,
                value       TEXT    NOT NULL,
                PRIMARY KEY (filename, filesize, filetime)
            )",
            self.table
        );
        conn.execute_batch(&sql).map_err(|e| StoreError::Schema(e.to_string()))?;
        log::trace!("Ensured cache table {}", self.table);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<String>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT value FROM \"{}\" WHERE filename = ?1 AND filesize = ?2 AND filetime = ?3",
            self.table
        );
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| StoreError::Read(e.to_string()))?;
        stmt.query_row(params![key.path, key.size, key.modified], |row| {
            row.get::<_, String>(0)
        })
        .optional()
        .map_err(|e| StoreError::Read(e.to_string()))
    }

    fn put(&self, entry: &CacheEntry) -> StoreResult<()> {
        let conn = self.connection()?;
        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\" (filename, filesize, filetime, analyzetime, value) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        stmt.execute(params![
            entry.key.path,
            entry.key.size,
            entry.key.modified,
            entry.analyzed_at.timestamp(),
            entry.value,
        ])
        .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        let removed = conn
            .execute(&format!("DELETE FROM \"{}\"", self.table), [])
            .map_err(|e| StoreError::Write(e.to_string()))?;
        log::debug!("Removed {} rows from {}", removed, self.table);
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        let conn = self.connection()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
