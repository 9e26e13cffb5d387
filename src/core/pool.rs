//! SQLite connection access with read/write separation.
//!
//! - A **write mutex** per DB serializes write access in-process.
//! - **Read connections** are created fresh per operation (no mutex,
//!   concurrent via WAL).
//! - Both paths set `busy_timeout` to ride out cross-process contention.
//!
//! Connections are not cached; WAL/SHM file handles do not survive well
//! across forked subprocesses, and open is cheap next to the I/O the
//! operations do anyway.

use crate::core::db;
use crate::core::error::EngineError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Write connection busy_timeout in seconds.
const WRITE_BUSY_TIMEOUT_SECS: u32 = 5;
/// Read connection busy_timeout in seconds.
const READ_BUSY_TIMEOUT_SECS: u32 = 5;

struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

/// Per-database write serialization plus unserialized WAL reads.
pub struct SqlitePool {
    entries: Mutex<HashMap<PathBuf, &'static PoolEntry>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<&'static PoolEntry, EngineError> {
        let canonical = db_path.to_path_buf();
        let mut entries = self.entries.lock().map_err(|_| {
            EngineError::ValidationError("SqlitePool entries lock poisoned".to_string())
        })?;
        if let Some(entry) = entries.get(&canonical) {
            return Ok(*entry);
        }
        let entry = Box::leak(Box::new(PoolEntry {
            write_lock: Mutex::new(()),
            db_path: canonical.clone(),
        }));
        entries.insert(canonical, entry);
        Ok(entry)
    }

    /// Execute a closure with a write connection. Write access is
    /// serialized per-DB via mutex.
    pub fn with_write<F, R>(&self, db_path: &Path, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry
            .write_lock
            .lock()
            .map_err(|_| EngineError::ValidationError("Pool write lock poisoned".to_string()))?;

        let conn = db::db_connect_with_timeout(
            &entry.db_path.to_string_lossy(),
            WRITE_BUSY_TIMEOUT_SECS,
        )?;

        f(&conn)
    }

    /// Execute a closure with a read connection (no mutex serialization;
    /// WAL mode allows concurrent readers across threads and processes).
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let conn =
            db::db_connect_with_timeout(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;

        f(&conn)
    }
}

/// Check if an error is a SQLite busy/locked error that is retryable.
pub fn is_busy_error(err: &EngineError) -> bool {
    match err {
        EngineError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}
