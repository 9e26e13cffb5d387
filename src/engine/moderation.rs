//! Admin-initiated review deletion.
//!
//! The primary path is delete-with-audit: one transaction reads the row,
//! records a moderation_log entry (reason plus a SHA-256 of the deleted
//! body), and deletes. On failure it falls back to a direct row delete;
//! an absent reviews table is repaired and reported as a no-op — nothing
//! to delete is not an error.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::{self, EngineError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::ratings;
use crate::engine::reconcile;
use clap::{Parser, Subcommand};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// The review existed and was removed.
    Deleted,
    /// Nothing matched (row absent, or table repaired from scratch).
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationReceipt {
    pub status: ModerationStatus,
}

pub fn initialize_moderation_db(root: &Path) -> Result<(), EngineError> {
    let broker = DbBroker::new(root);
    let db_path = db::catalog_db_path(root);

    broker.with_conn(&db_path, "reelscore", "moderation.init", |conn| {
        conn.execute(schemas::MODERATION_LOG_SCHEMA, [])?;
        Ok(())
    })
}

/// Delete a review on a moderator's authority.
pub fn delete_review(
    store: &Store,
    review_id: &str,
    moderator_id: i64,
    reason: &str,
) -> Result<ModerationReceipt, EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    let primary = broker.with_conn(&db_path, "reelscore", "moderation.delete", |conn| {
        let tx = conn.unchecked_transaction()?;

        let row: Option<(String, Option<i64>)> = tx
            .query_row(
                "SELECT body, COALESCE(content_id, movie_id) FROM reviews WHERE id = ?1",
                params![review_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((body, content_id)) = row else {
            tx.commit()?;
            return Ok((ModerationStatus::Noop, None));
        };

        let body_sha256 = format!("{:x}", Sha256::digest(body.as_bytes()));
        tx.execute(
            "INSERT INTO moderation_log(id, review_id, moderator_id, reason, body_sha256, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Ulid::new().to_string(),
                review_id,
                moderator_id,
                reason,
                body_sha256,
                time::now_epoch_z()
            ],
        )?;
        tx.execute("DELETE FROM reviews WHERE id = ?1", params![review_id])?;
        tx.commit()?;
        Ok((ModerationStatus::Deleted, content_id))
    });

    match primary {
        Ok((status, content_id)) => {
            if status == ModerationStatus::Deleted {
                if let Err(e) = ratings::recompute(store, content_id) {
                    eprintln!("Warning: aggregate recompute after delete failed: {}", e);
                }
            }
            Ok(ModerationReceipt { status })
        }
        Err(e) => {
            eprintln!("Warning: audited delete failed, using direct delete: {}", e);
            fallback_delete(store, review_id)
        }
    }
}

/// Direct row delete, with absent-table repair.
fn fallback_delete(store: &Store, review_id: &str) -> Result<ModerationReceipt, EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    let result = broker.with_conn(&db_path, "reelscore", "moderation.direct_delete", |conn| {
        let affected = conn.execute("DELETE FROM reviews WHERE id = ?1", params![review_id])?;
        Ok(affected)
    });

    match result {
        Ok(affected) => Ok(ModerationReceipt {
            status: if affected > 0 {
                ModerationStatus::Deleted
            } else {
                ModerationStatus::Noop
            },
        }),
        Err(e) if error::is_no_such_table(&e) => {
            broker.with_conn(&db_path, "reelscore", "moderation.repair", |conn| {
                reconcile::ensure_table(conn, schemas::REVIEWS_TABLE);
                Ok(())
            })?;
            Ok(ModerationReceipt {
                status: ModerationStatus::Noop,
            })
        }
        Err(e) => Err(e),
    }
}

#[derive(Parser, Debug)]
#[clap(name = "moderate", about = "Admin moderation actions.")]
pub struct ModerationCli {
    #[clap(subcommand)]
    pub command: ModerationCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModerationCommand {
    /// Delete a review with an audit trail entry.
    Delete {
        #[clap(long)]
        review: String,
        #[clap(long)]
        moderator: i64,
        #[clap(long)]
        reason: String,
    },
}

pub fn run_moderation_cli(store: &Store, cli: ModerationCli) -> Result<(), EngineError> {
    match cli.command {
        ModerationCommand::Delete {
            review,
            moderator,
            reason,
        } => {
            let receipt = delete_review(store, &review, moderator, &reason)?;
            println!(
                "{}",
                time::command_envelope(
                    "moderate.delete",
                    "ok",
                    serde_json::to_value(&receipt)
                        .map_err(|e| EngineError::ValidationError(e.to_string()))?
                )
            );
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "moderate",
        "version": "0.1.0",
        "description": "Audited review deletion with direct-delete fallback",
        "commands": [
            { "name": "delete", "parameters": ["review", "moderator", "reason"] }
        ],
        "storage": ["catalog.db"]
    })
}
