use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Write failed: {0}")]
    WriteError(String),
}

/// True when the underlying SQLite error reports a missing table.
pub fn is_no_such_table(err: &EngineError) -> bool {
    match err {
        EngineError::RusqliteError(e) => e.to_string().contains("no such table"),
        _ => false,
    }
}

/// True when the underlying SQLite error is a UNIQUE constraint violation.
pub fn is_constraint_violation(err: &EngineError) -> bool {
    match err {
        EngineError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::ConstraintViolation
        ),
        _ => false,
    }
}

/// Extract the column name from an unknown-column class of SQLite error.
///
/// SQLite reports these as `table reviews has no column named emotions`
/// (INSERT against a missing column) or `no such column: reviews_count`
/// (reference inside an expression).
pub fn missing_column_name(err: &EngineError) -> Option<String> {
    let msg = match err {
        EngineError::RusqliteError(e) => e.to_string(),
        EngineError::UnknownColumn(col) => return Some(col.clone()),
        _ => return None,
    };
    let re = regex::Regex::new(r"(?:has no column named|no such column:?)\s+`?([A-Za-z_][A-Za-z0-9_]*)`?")
        .expect("static regex");
    re.captures(&msg)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
