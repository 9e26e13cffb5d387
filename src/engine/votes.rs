//! Vote ledger: one vote per (user, review) with toggle semantics.
//!
//! Casting the same kind twice clears the vote; casting the opposite kind
//! flips it in place. The whole read-decide-write sequence runs inside a
//! single transaction on the serialized write connection, so the reported
//! status is always consistent with the transition that actually happened.
//! UNIQUE(user_id, review_id) stays as the safety net underneath; if it
//! ever fires the request fails outright rather than being retried.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
pub enum VoteKind {
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "DISLIKE")]
    Dislike,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Like => "LIKE",
            VoteKind::Dislike => "DISLIKE",
        }
    }

    fn from_db(s: &str) -> Option<Self> {
        match s {
            "LIKE" => Some(VoteKind::Like),
            "DISLIKE" => Some(VoteKind::Dislike),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub status: VoteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<VoteKind>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VoteCounts {
    pub likes: i64,
    pub dislikes: i64,
}

pub fn initialize_votes_db(root: &Path) -> Result<(), error::EngineError> {
    let broker = DbBroker::new(root);
    let db_path = db::catalog_db_path(root);

    broker.with_conn(&db_path, "reelscore", "votes.init", |conn| {
        conn.execute(schemas::REVIEW_VOTES_SCHEMA, [])?;
        conn.execute(schemas::REVIEW_VOTES_INDEX_REVIEW, [])?;
        Ok(())
    })
}

/// Apply one vote action and report the transition taken.
///
/// Transition table per (user, review):
/// none+K -> added(K); K+K -> removed; K+K' -> updated(K').
pub fn vote(
    store: &Store,
    user_id: i64,
    review_id: &str,
    kind: VoteKind,
) -> Result<VoteReceipt, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_conn(&db_path, "reelscore", "votes.cast", |conn| {
        let tx = conn.unchecked_transaction()?;

        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT id, vote_kind FROM review_votes WHERE user_id = ?1 AND review_id = ?2",
                params![user_id, review_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let receipt = match existing {
            Some((vote_id, current)) if VoteKind::from_db(&current) == Some(kind) => {
                tx.execute("DELETE FROM review_votes WHERE id = ?1", params![vote_id])?;
                VoteReceipt {
                    status: VoteStatus::Removed,
                    vote: None,
                }
            }
            Some((vote_id, _)) => {
                tx.execute(
                    "UPDATE review_votes SET vote_kind = ?1, created_at = ?2 WHERE id = ?3",
                    params![kind.as_str(), time::now_epoch_z(), vote_id],
                )?;
                VoteReceipt {
                    status: VoteStatus::Updated,
                    vote: Some(kind),
                }
            }
            None => {
                tx.execute(
                    "INSERT INTO review_votes(id, user_id, review_id, vote_kind, created_at)
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                    params![
                        Ulid::new().to_string(),
                        user_id,
                        review_id,
                        kind.as_str(),
                        time::now_epoch_z()
                    ],
                )?;
                VoteReceipt {
                    status: VoteStatus::Added,
                    vote: Some(kind),
                }
            }
        };

        tx.commit()?;
        Ok(receipt)
    })
}

/// Like/dislike totals for one review; zero on no votes, never NULL.
pub fn vote_counts(store: &Store, review_id: &str) -> Result<VoteCounts, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_read(&db_path, |conn| {
        let counts = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN vote_kind = 'LIKE' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN vote_kind = 'DISLIKE' THEN 1 ELSE 0 END), 0)
             FROM review_votes WHERE review_id = ?1",
            params![review_id],
            |row| {
                Ok(VoteCounts {
                    likes: row.get(0)?,
                    dislikes: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    })
}

#[derive(Parser, Debug)]
#[clap(name = "vote", about = "Cast and inspect review votes.")]
pub struct VoteCli {
    #[clap(subcommand)]
    pub command: VoteCommand,
}

#[derive(Subcommand, Debug)]
pub enum VoteCommand {
    /// Cast a vote (toggles on repeat, flips on opposite).
    Cast {
        #[clap(long)]
        user: i64,
        #[clap(long)]
        review: String,
        #[clap(long, value_enum)]
        kind: VoteKind,
    },
    /// Show like/dislike counts for a review.
    Counts {
        #[clap(long)]
        review: String,
    },
}

pub fn run_vote_cli(store: &Store, cli: VoteCli) -> Result<(), error::EngineError> {
    match cli.command {
        VoteCommand::Cast { user, review, kind } => {
            let receipt = vote(store, user, &review, kind)?;
            println!(
                "{}",
                time::command_envelope(
                    "vote.cast",
                    "ok",
                    serde_json::to_value(&receipt)
                        .map_err(|e| error::EngineError::ValidationError(e.to_string()))?
                )
            );
        }
        VoteCommand::Counts { review } => {
            let counts = vote_counts(store, &review)?;
            println!("likes: {}  dislikes: {}", counts.likes, counts.dislikes);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "vote",
        "version": "0.1.0",
        "description": "Per-review vote ledger with toggle semantics",
        "commands": [
            { "name": "cast", "parameters": ["user", "review", "kind"] },
            { "name": "counts", "parameters": ["review"] }
        ],
        "storage": ["catalog.db"]
    })
}
