//! Review event outbox.
//!
//! Outbound analytics events are not emitted inline on the request path;
//! the write path enqueues a row here (best-effort) and a separate drain
//! pass hands pending rows to an `EventSink`. A row is marked dispatched
//! only after the sink accepts it, so delivery is at-least-once and a
//! sink failure leaves the event queued for the next pass.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;
use ulid::Ulid;

pub const EVENT_REVIEW_CREATED: &str = "review_created";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: String,
    pub event_type: String,
    pub user_id: i64,
    pub content_id: Option<i64>,
    pub content_kind: String,
    pub rating: Option<f64>,
    pub emotions: Option<String>,
    pub aspects: Option<String>,
    pub created_at: String,
    pub dispatched_at: Option<String>,
}

/// Outbound delivery collaborator. Implementations transport the event
/// (message bus, log, test collector); the engine only needs accept/fail.
pub trait EventSink {
    fn deliver(&mut self, event: &ReviewEvent) -> Result<(), error::EngineError>;
}

/// Sink that prints each event as a JSON line.
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn deliver(&mut self, event: &ReviewEvent) -> Result<(), error::EngineError> {
        let line = serde_json::to_string(event)
            .map_err(|e| error::EngineError::ValidationError(e.to_string()))?;
        println!("{}", line);
        Ok(())
    }
}

pub fn initialize_events_db(root: &Path) -> Result<(), error::EngineError> {
    let broker = DbBroker::new(root);
    let db_path = db::catalog_db_path(root);

    broker.with_conn(&db_path, "reelscore", "events.init", |conn| {
        conn.execute(schemas::REVIEW_EVENTS_SCHEMA, [])?;
        conn.execute(schemas::REVIEW_EVENTS_INDEX_PENDING, [])?;
        Ok(())
    })
}

/// Record a review_created event for later delivery.
#[allow(clippy::too_many_arguments)]
pub fn enqueue_review_created(
    store: &Store,
    user_id: i64,
    content_id: Option<i64>,
    content_kind: &str,
    rating: Option<f64>,
    emotions: Option<&str>,
    aspects: Option<&str>,
) -> Result<String, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    let id = Ulid::new().to_string();

    broker.with_conn(&db_path, "reelscore", "events.enqueue", |conn| {
        conn.execute(
            "INSERT INTO review_events(id, event_type, user_id, content_id, content_kind, rating, emotions, aspects, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                EVENT_REVIEW_CREATED,
                user_id,
                content_id,
                content_kind,
                rating,
                emotions,
                aspects,
                time::now_epoch_z()
            ],
        )?;
        Ok(())
    })?;

    Ok(id)
}

/// Undispatched events, oldest first.
pub fn pending(store: &Store) -> Result<Vec<ReviewEvent>, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_read(&db_path, |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, event_type, user_id, content_id, content_kind, rating, emotions, aspects, created_at, dispatched_at
             FROM review_events WHERE dispatched_at IS NULL ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_event)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(error::EngineError::RusqliteError)?;
        Ok(rows)
    })
}

/// Deliver up to `batch` pending events to `sink`. Each event is marked
/// dispatched only after the sink accepts it; the first sink failure
/// stops the pass and leaves the remainder (including the failed event)
/// queued. Returns the number delivered.
pub fn drain(
    store: &Store,
    sink: &mut dyn EventSink,
    batch: usize,
) -> Result<usize, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    let queued: Vec<ReviewEvent> = {
        let mut all = pending(store)?;
        all.truncate(batch);
        all
    };

    let mut delivered = 0usize;
    for event in &queued {
        if let Err(e) = sink.deliver(event) {
            eprintln!("Warning: sink rejected event {}: {}", event.id, e);
            break;
        }
        broker.with_conn(&db_path, "reelscore", "events.dispatch", |conn| {
            conn.execute(
                "UPDATE review_events SET dispatched_at = ?1 WHERE id = ?2 AND dispatched_at IS NULL",
                params![time::now_epoch_z(), event.id],
            )?;
            Ok(())
        })?;
        delivered += 1;
    }
    Ok(delivered)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewEvent> {
    Ok(ReviewEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        user_id: row.get(2)?,
        content_id: row.get(3)?,
        content_kind: row.get(4)?,
        rating: row.get(5)?,
        emotions: row.get(6)?,
        aspects: row.get(7)?,
        created_at: row.get(8)?,
        dispatched_at: row.get(9)?,
    })
}

#[derive(Parser, Debug)]
#[clap(name = "events", about = "Inspect and drain the review event outbox.")]
pub struct EventsCli {
    #[clap(subcommand)]
    pub command: EventsCommand,
}

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// Deliver pending events to stdout and mark them dispatched.
    Drain {
        #[clap(long, default_value = "100")]
        batch: usize,
    },
    /// List pending (undispatched) events.
    Pending,
}

pub fn run_events_cli(store: &Store, cli: EventsCli) -> Result<(), error::EngineError> {
    match cli.command {
        EventsCommand::Drain { batch } => {
            let mut sink = StdoutSink;
            let delivered = drain(store, &mut sink, batch)?;
            println!("Delivered {} event(s)", delivered);
        }
        EventsCommand::Pending => {
            let queued = pending(store)?;
            if queued.is_empty() {
                println!("Outbox empty");
            }
            for event in queued {
                println!(
                    "{}  {}  user={}  content={:?}",
                    event.id, event.event_type, event.user_id, event.content_id
                );
            }
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "events",
        "version": "0.1.0",
        "description": "At-least-once review event outbox",
        "commands": [
            { "name": "drain", "parameters": ["batch"] },
            { "name": "pending" }
        ],
        "storage": ["catalog.db"]
    })
}
