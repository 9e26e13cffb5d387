//! Content-level rating aggregates, recomputed in full after every review
//! mutation.
//!
//! `recompute` is a deterministic function of the current review set — not
//! an incremental patch — so any interleaving of concurrent recomputes for
//! the same content id converges to the same values. A stale snapshot is
//! self-corrected by the next write's recompute.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContentAggregates {
    pub avg_rating: f64,
    pub critics_rating: f64,
    pub audience_rating: f64,
    pub reviews_count: i64,
}

/// Recompute all four aggregate fields for `content_id` in one pass over
/// the reviews with a non-null rating. No-op when the id is absent.
///
/// The content reference is resolved through both historical column names
/// (`content_id`, then legacy `movie_id`). Subsets with no matching
/// reviews land at 0, never NULL.
pub fn recompute(store: &Store, content_id: Option<i64>) -> Result<(), error::EngineError> {
    let Some(content_id) = content_id else {
        return Ok(());
    };

    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_conn(&db_path, "reelscore", "rating.recompute", |conn| {
        recompute_on(conn, content_id)
    })
}

/// Connection-level recompute, shared with callers already inside a broker
/// operation.
pub fn recompute_on(conn: &Connection, content_id: i64) -> Result<(), error::EngineError> {
    conn.execute(
        "UPDATE content SET
            avg_rating = COALESCE((
                SELECT ROUND(AVG(r.rating), 2) FROM reviews r
                WHERE COALESCE(r.content_id, r.movie_id) = content.id AND r.rating IS NOT NULL
            ), 0),
            critics_rating = COALESCE((
                SELECT ROUND(AVG(r.rating), 2) FROM reviews r
                JOIN users u ON u.id = r.user_id
                WHERE COALESCE(r.content_id, r.movie_id) = content.id
                  AND r.rating IS NOT NULL AND u.role = 'CRITIC'
            ), 0),
            audience_rating = COALESCE((
                SELECT ROUND(AVG(r.rating), 2) FROM reviews r
                JOIN users u ON u.id = r.user_id
                WHERE COALESCE(r.content_id, r.movie_id) = content.id
                  AND r.rating IS NOT NULL AND u.role = 'USER'
            ), 0),
            reviews_count = (
                SELECT COUNT(*) FROM reviews r
                WHERE COALESCE(r.content_id, r.movie_id) = content.id AND r.rating IS NOT NULL
            ),
            updated_at = ?2
         WHERE content.id = ?1",
        params![content_id, time::now_epoch_z()],
    )?;
    Ok(())
}

/// Current aggregate fields for one content item.
pub fn aggregates(
    store: &Store,
    content_id: i64,
) -> Result<Option<ContentAggregates>, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_read(&db_path, |conn| {
        let row = conn
            .query_row(
                "SELECT avg_rating, critics_rating, audience_rating, reviews_count
                 FROM content WHERE id = ?1",
                params![content_id],
                |row| {
                    Ok(ContentAggregates {
                        avg_rating: row.get(0)?,
                        critics_rating: row.get(1)?,
                        audience_rating: row.get(2)?,
                        reviews_count: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

#[derive(Parser, Debug)]
#[clap(name = "rating", about = "Recompute and inspect content rating aggregates.")]
pub struct RatingCli {
    #[clap(subcommand)]
    pub command: RatingCommand,
}

#[derive(Subcommand, Debug)]
pub enum RatingCommand {
    /// Recompute aggregates for a content item from its review set.
    Recompute {
        #[clap(long)]
        content: i64,
    },
    /// Show current aggregates for a content item.
    Show {
        #[clap(long)]
        content: i64,
    },
}

pub fn run_rating_cli(store: &Store, cli: RatingCli) -> Result<(), error::EngineError> {
    match cli.command {
        RatingCommand::Recompute { content } => {
            recompute(store, Some(content))?;
            println!("Aggregates recomputed for content {}", content);
        }
        RatingCommand::Show { content } => match aggregates(store, content)? {
            Some(agg) => println!(
                "avg: {:.2}  critics: {:.2}  audience: {:.2}  reviews: {}",
                agg.avg_rating, agg.critics_rating, agg.audience_rating, agg.reviews_count
            ),
            None => println!("Content not found: {}", content),
        },
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "rating",
        "version": "0.1.0",
        "description": "Derived content rating aggregates (full recompute)",
        "commands": [
            { "name": "recompute", "parameters": ["content"] },
            { "name": "show", "parameters": ["content"] }
        ],
        "storage": ["catalog.db"]
    })
}
