use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::EngineError> {
    db_connect_with_timeout(db_path, 5)
}

pub fn db_connect_with_timeout(
    db_path: &str,
    busy_timeout_secs: u32,
) -> Result<Connection, error::EngineError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(busy_timeout_secs as u64))
        .map_err(error::EngineError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::EngineError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::EngineError::RusqliteError)?;
    Ok(conn)
}

pub fn catalog_db_path(root: &Path) -> PathBuf {
    root.join(schemas::CATALOG_DB_NAME)
}
