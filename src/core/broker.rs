use crate::core::db;
use crate::core::error;
use crate::core::pool;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The DB Broker is the thin waist for state access: every mutation goes
/// through `with_conn`, which serializes write access and appends one
/// structured audit event per operation to `broker.events.jsonl`.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join("broker.events.jsonl"),
        }
    }

    /// Execute a closure with a serialized write connection to the given DB.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        op_name: &str,
        f: F,
    ) -> Result<R, error::EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, error::EngineError>,
    {
        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let result = pool::global_pool().with_write(db_path, f);

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(actor, op_name, &db_id, status)?;

        result
    }

    /// Execute a closure with a read connection. Reads are not audited.
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, error::EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, error::EngineError>,
    {
        pool::global_pool().with_read(db_path, f)
    }

    fn log_event(
        &self,
        actor: &str,
        op: &str,
        db_id: &str,
        status: &str,
    ) -> Result<(), error::EngineError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(error::EngineError::IoError)?;

        let line = serde_json::to_string(&ev)
            .map_err(|e| error::EngineError::ValidationError(e.to_string()))?;
        writeln!(f, "{}", line).map_err(error::EngineError::IoError)?;
        Ok(())
    }
}

/// Open a bare connection outside the broker. Reserved for schema
/// initialization, where the audit log directory may not exist yet.
pub fn raw_connect(db_path: &Path) -> Result<Connection, error::EngineError> {
    db::db_connect(&db_path.to_string_lossy())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "State mutation broker with per-operation audit log",
        "commands": [
            { "name": "audit", "description": "Show the mutation audit log" }
        ],
        "storage": ["broker.events.jsonl"]
    })
}
