//! Review ingestion: the entry point for viewer and critic submissions.
//!
//! Writes take a layered path. The primary path is a strict transactional
//! insert that names every canonical column — the moral equivalent of the
//! platform's old stored procedures. When it fails for any reason, the
//! fallback path reconciles the schema (ensure tables, ensure columns,
//! relax stray NOT NULLs) and builds an INSERT from the columns actually
//! present, never assuming one exists. An unknown-column failure inside
//! the fallback gets one targeted repair pass and exactly one retry.
//!
//! Side effects — aggregate recompute, achievement checks, XP, the outbox
//! event — run best-effort after the write; none of them can undo it.

use crate::core::broker::DbBroker;
use crate::core::config::EngineConfig;
use crate::core::db;
use crate::core::error::{self, EngineError};
use crate::core::output;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::gamification::{AchievementTrigger, Achievement, Metric, SqliteGamification};
use crate::engine::ratings;
use crate::engine::reconcile::{self, ColumnMeta};
use crate::engine::events;
use clap::{Parser, Subcommand};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use ulid::Ulid;

#[derive(Debug, Clone, Default)]
pub struct ReviewPayload {
    pub content_id: Option<i64>,
    pub body: String,
    pub aspects: Option<JsonValue>,
    pub emotions: Option<JsonValue>,
    pub rating: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    /// Primary transactional path succeeded.
    Created,
    /// Fallback dynamic insert succeeded.
    Inserted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub review_id: String,
    pub status: SubmitStatus,
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub content_id: Option<i64>,
    pub user_id: i64,
    pub username: Option<String>,
    pub body: String,
    pub aspects: Option<String>,
    pub emotions: Option<String>,
    pub rating: Option<f64>,
    pub created_at: String,
    pub likes: i64,
    pub dislikes: i64,
}

pub fn initialize_reviews_db(root: &Path) -> Result<(), error::EngineError> {
    let broker = DbBroker::new(root);
    let db_path = db::catalog_db_path(root);

    broker.with_conn(&db_path, "reelscore", "reviews.init", |conn| {
        conn.execute(schemas::REVIEWS_SCHEMA, [])?;
        conn.execute(schemas::REVIEWS_INDEX_CONTENT, [])?;
        conn.execute(schemas::REVIEWS_INDEX_USER, [])?;
        conn.execute(schemas::CONTENT_SCHEMA, [])?;
        Ok(())
    })
}

/// Orchestrates review submission against one store, with the
/// gamification collaborator injected.
pub struct ReviewIngestor<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
    gamification: &'a dyn AchievementTrigger,
}

impl<'a> ReviewIngestor<'a> {
    pub fn new(
        store: &'a Store,
        config: &'a EngineConfig,
        gamification: &'a dyn AchievementTrigger,
    ) -> Self {
        Self {
            store,
            config,
            gamification,
        }
    }

    /// Ingestor wired with the shipped SQLite gamification backend.
    pub fn with_defaults(store: &'a Store, config: &'a EngineConfig) -> Self {
        static GAMIFICATION: SqliteGamification = SqliteGamification;
        Self::new(store, config, &GAMIFICATION)
    }

    pub fn submit_viewer_review(
        &self,
        user_id: i64,
        payload: ReviewPayload,
    ) -> Result<SubmitReceipt, EngineError> {
        self.submit(user_id, payload, self.config.viewer_review_xp, "review.submit")
    }

    pub fn submit_critic_review(
        &self,
        critic_id: i64,
        payload: ReviewPayload,
    ) -> Result<SubmitReceipt, EngineError> {
        self.submit(
            critic_id,
            payload,
            self.config.critic_review_xp,
            "review.publish",
        )
    }

    fn submit(
        &self,
        user_id: i64,
        payload: ReviewPayload,
        xp: i64,
        op: &str,
    ) -> Result<SubmitReceipt, EngineError> {
        let normalized = normalize_payload(payload)?;
        let broker = DbBroker::new(&self.store.root);
        let db_path = db::catalog_db_path(&self.store.root);

        let review_id = Ulid::new().to_string();
        let created_at = time::now_epoch_z();

        let primary = broker.with_conn(&db_path, "reelscore", op, |conn| {
            primary_insert(conn, &review_id, user_id, &normalized, &created_at)
        });

        let (review_id, status) = match primary {
            Ok(()) => (review_id, SubmitStatus::Created),
            Err(e) => {
                eprintln!("Warning: primary review write failed, using fallback insert: {}", e);
                let id = broker.with_conn(&db_path, "reelscore", "review.fallback_insert", |conn| {
                    fallback_insert(conn, user_id, &normalized, &created_at)
                })?;
                (id, SubmitStatus::Inserted)
            }
        };

        let achievements = self.post_write(user_id, &normalized, xp);

        Ok(SubmitReceipt {
            review_id,
            status,
            achievements,
        })
    }

    /// Side effects after a successful write. Each one is best-effort: a
    /// failure is warned and swallowed, never propagated into the result
    /// of the submission.
    fn post_write(&self, user_id: i64, payload: &NormalizedPayload, xp: i64) -> Vec<Achievement> {
        if let Err(e) = ratings::recompute(self.store, payload.content_id) {
            eprintln!("Warning: aggregate recompute failed: {}", e);
        }

        let achievements = self.check_review_achievements(user_id, payload);

        if let Err(e) = self.gamification.award_xp(self.store, user_id, xp) {
            eprintln!("Warning: XP award failed for user {}: {}", user_id, e);
        }

        let content_kind = content_kind(self.store, payload.content_id);
        if let Err(e) = events::enqueue_review_created(
            self.store,
            user_id,
            payload.content_id,
            &content_kind,
            payload.rating,
            payload.emotions.as_deref(),
            payload.aspects.as_deref(),
        ) {
            eprintln!("Warning: event enqueue failed: {}", e);
        }

        achievements
    }

    /// Evaluate the three submission metrics and return the union of
    /// newly unlocked achievements.
    fn check_review_achievements(
        &self,
        user_id: i64,
        payload: &NormalizedPayload,
    ) -> Vec<Achievement> {
        let mut unlocked = Vec::new();

        match review_count_for_user(self.store, user_id) {
            Ok(count) => {
                match self.gamification.check_and_award(
                    self.store,
                    user_id,
                    Metric::ReviewCount,
                    count as f64,
                ) {
                    Ok(mut earned) => unlocked.append(&mut earned),
                    Err(e) => eprintln!("Warning: achievement check failed for user {}: {}", user_id, e),
                }
            }
            Err(e) => eprintln!("Warning: review count failed for user {}: {}", user_id, e),
        }

        if !payload.body.is_empty() {
            match self.gamification.check_and_award(
                self.store,
                user_id,
                Metric::ReviewLength,
                payload.body.chars().count() as f64,
            ) {
                Ok(mut earned) => unlocked.append(&mut earned),
                Err(e) => eprintln!("Warning: achievement check failed for user {}: {}", user_id, e),
            }
        }

        if let Some(rating) = payload.rating {
            match self
                .gamification
                .check_and_award(self.store, user_id, Metric::RatingValue, rating)
            {
                Ok(mut earned) => unlocked.append(&mut earned),
                Err(e) => eprintln!("Warning: achievement check failed for user {}: {}", user_id, e),
            }
        }

        unlocked
    }
}

struct NormalizedPayload {
    content_id: Option<i64>,
    body: String,
    aspects: Option<String>,
    emotions: Option<String>,
    rating: Option<f64>,
}

/// Validate the engine's own invariants and serialize structured fields.
/// Ratings live in [0,10] and are stored at one-decimal precision.
fn normalize_payload(payload: ReviewPayload) -> Result<NormalizedPayload, EngineError> {
    let rating = match payload.rating {
        Some(r) => {
            if !(0.0..=10.0).contains(&r) {
                return Err(EngineError::ValidationError(format!(
                    "rating out of range [0,10]: {}",
                    r
                )));
            }
            Some((r * 10.0).round() / 10.0)
        }
        None => None,
    };

    let aspects = serialize_structured("aspects", payload.aspects)?;
    let emotions = serialize_structured("emotions", payload.emotions)?;

    Ok(NormalizedPayload {
        content_id: payload.content_id,
        body: payload.body,
        aspects,
        emotions,
        rating,
    })
}

fn serialize_structured(
    field: &str,
    value: Option<JsonValue>,
) -> Result<Option<String>, EngineError> {
    match value {
        None => Ok(None),
        Some(v) => {
            if !v.is_object() {
                return Err(EngineError::ValidationError(format!(
                    "{} must be a JSON object",
                    field
                )));
            }
            Ok(Some(serde_json::to_string(&v).map_err(|e| {
                EngineError::ValidationError(e.to_string())
            })?))
        }
    }
}

/// Primary write path: one transaction, every canonical column named.
/// Fails fast on any schema drift, handing control to the fallback.
fn primary_insert(
    conn: &Connection,
    review_id: &str,
    user_id: i64,
    payload: &NormalizedPayload,
    created_at: &str,
) -> Result<(), EngineError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO reviews (id, content_id, movie_id, user_id, body, aspects, emotions, rating, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            review_id,
            payload.content_id,
            payload.content_id,
            user_id,
            payload.body,
            payload.aspects,
            payload.emotions,
            payload.rating,
            created_at
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Fallback write path: repair the schema, then insert through whatever
/// columns are actually present. One targeted repair-and-retry on an
/// unknown-column failure; the second failure is terminal.
fn fallback_insert(
    conn: &Connection,
    user_id: i64,
    payload: &NormalizedPayload,
    created_at: &str,
) -> Result<String, EngineError> {
    reconcile::ensure_table(conn, schemas::REVIEWS_TABLE);
    reconcile::ensure_columns(conn, schemas::REVIEWS_TABLE, schemas::REVIEWS_COLUMNS);
    reconcile::ensure_table(conn, schemas::REVIEW_VOTES_TABLE);
    reconcile::ensure_columns(conn, schemas::REVIEW_VOTES_TABLE, schemas::REVIEW_VOTES_COLUMNS);
    reconcile::ensure_table(conn, schemas::CONTENT_TABLE);
    reconcile::ensure_columns(conn, schemas::CONTENT_TABLE, schemas::CONTENT_AGGREGATE_COLUMNS);
    reconcile::relax_required_columns(
        conn,
        schemas::REVIEWS_TABLE,
        schemas::REVIEWS_PROTECTED_COLUMNS,
    );

    let columns = reconcile::column_metadata(conn, schemas::REVIEWS_TABLE);
    let review_id = Ulid::new().to_string();
    let (sql, values) = build_insert(&columns, &review_id, user_id, payload, created_at);

    match conn.execute(&sql, rusqlite::params_from_iter(values.iter())) {
        Ok(_) => Ok(review_id),
        Err(e) => {
            let err = EngineError::RusqliteError(e);
            let Some(column) = error::missing_column_name(&err) else {
                return Err(EngineError::WriteError(err.to_string()));
            };
            reconcile::repair_for_column(conn, &column);
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))
                .map_err(|retry_err| EngineError::WriteError(retry_err.to_string()))?;
            Ok(review_id)
        }
    }
}

/// Build an INSERT over only the columns present in the store, mirroring
/// the content reference into both alias columns when both exist.
fn build_insert(
    columns: &FxHashMap<String, ColumnMeta>,
    review_id: &str,
    user_id: i64,
    payload: &NormalizedPayload,
    created_at: &str,
) -> (String, Vec<SqlValue>) {
    let mut fields: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    let push = |fields: &mut Vec<&str>, values: &mut Vec<SqlValue>, name: &'static str, v: SqlValue| {
        if columns.contains_key(name) {
            fields.push(name);
            values.push(v);
        }
    };

    let content_ref = payload
        .content_id
        .map(SqlValue::Integer)
        .unwrap_or(SqlValue::Null);

    push(&mut fields, &mut values, "id", SqlValue::Text(review_id.to_string()));
    push(&mut fields, &mut values, "content_id", content_ref.clone());
    push(&mut fields, &mut values, "movie_id", content_ref);
    push(&mut fields, &mut values, "user_id", SqlValue::Integer(user_id));
    push(&mut fields, &mut values, "body", SqlValue::Text(payload.body.clone()));
    push(
        &mut fields,
        &mut values,
        "aspects",
        payload
            .aspects
            .clone()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    );
    push(
        &mut fields,
        &mut values,
        "emotions",
        payload
            .emotions
            .clone()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    );
    push(
        &mut fields,
        &mut values,
        "rating",
        payload
            .rating
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
    );
    push(&mut fields, &mut values, "created_at", SqlValue::Text(created_at.to_string()));

    let placeholders = (1..=fields.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO reviews ({}) VALUES ({})",
        fields.join(", "),
        placeholders
    );
    (sql, values)
}

fn review_count_for_user(store: &Store, user_id: i64) -> Result<i64, EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    broker.with_read(&db_path, |conn| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    })
}

fn content_kind(store: &Store, content_id: Option<i64>) -> String {
    let Some(content_id) = content_id else {
        return "UNKNOWN".to_string();
    };
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    broker
        .with_read(&db_path, |conn| {
            let kind: Option<String> = conn
                .query_row(
                    "SELECT kind FROM content WHERE id = ?1",
                    params![content_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(kind)
        })
        .ok()
        .flatten()
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Reviews for a content item, newest first, with author name and vote
/// counts. Falls back to the legacy `movie_id` reference when the query
/// against `content_id` fails, and to repair-plus-empty when the table is
/// missing altogether.
pub fn reviews_by_content(
    store: &Store,
    content_id: i64,
) -> Result<Vec<ReviewRecord>, EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    let primary = broker.with_read(&db_path, |conn| {
        select_reviews(conn, "COALESCE(r.content_id, r.movie_id) = ?1", content_id)
    });

    match primary {
        Ok(rows) => Ok(rows),
        Err(e) => {
            let legacy = broker.with_read(&db_path, |conn| {
                select_reviews(conn, "r.movie_id = ?1", content_id)
            });
            match legacy {
                Ok(rows) => Ok(rows),
                Err(legacy_err) if error::is_no_such_table(&legacy_err) => {
                    broker.with_conn(&db_path, "reelscore", "reviews.repair", |conn| {
                        reconcile::ensure_table(conn, schemas::REVIEWS_TABLE);
                        Ok(())
                    })?;
                    Ok(Vec::new())
                }
                Err(_) => Err(e),
            }
        }
    }
}

/// Reviews authored by one user, newest first.
pub fn reviews_by_user(store: &Store, user_id: i64) -> Result<Vec<ReviewRecord>, EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    let result = broker.with_read(&db_path, |conn| {
        select_reviews(conn, "r.user_id = ?1", user_id)
    });

    match result {
        Ok(rows) => Ok(rows),
        Err(e) if error::is_no_such_table(&e) => {
            broker.with_conn(&db_path, "reelscore", "reviews.repair", |conn| {
                reconcile::ensure_table(conn, schemas::REVIEWS_TABLE);
                Ok(())
            })?;
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn select_reviews(
    conn: &Connection,
    predicate: &str,
    arg: i64,
) -> Result<Vec<ReviewRecord>, EngineError> {
    let sql = format!(
        "SELECT
            r.id, r.content_id, r.user_id, u.username, r.body, r.aspects, r.emotions,
            r.rating, r.created_at,
            (SELECT COUNT(*) FROM review_votes rv WHERE rv.review_id = r.id AND rv.vote_kind = 'LIKE') as likes,
            (SELECT COUNT(*) FROM review_votes rv WHERE rv.review_id = r.id AND rv.vote_kind = 'DISLIKE') as dislikes
         FROM reviews r
         LEFT JOIN users u ON r.user_id = u.id
         WHERE {}
         ORDER BY r.id DESC",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![arg], |row| {
            Ok(ReviewRecord {
                id: row.get(0)?,
                content_id: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get(3)?,
                body: row.get(4)?,
                aspects: row.get(5)?,
                emotions: row.get(6)?,
                rating: row.get(7)?,
                created_at: row.get(8)?,
                likes: row.get(9)?,
                dislikes: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(EngineError::RusqliteError)?;
    Ok(rows)
}

#[derive(Parser, Debug)]
#[clap(name = "review", about = "Submit and browse reviews.")]
pub struct ReviewCli {
    #[clap(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Subcommand, Debug)]
pub enum ReviewCommand {
    /// Submit a viewer review.
    Add {
        #[clap(long)]
        user: i64,
        #[clap(long)]
        content: i64,
        #[clap(long)]
        body: String,
        #[clap(long)]
        rating: Option<f64>,
        /// JSON object of named sub-ratings, e.g. '{"acting": 8}'.
        #[clap(long)]
        aspects: Option<String>,
        /// JSON object of named emotion intensities.
        #[clap(long)]
        emotions: Option<String>,
    },
    /// Publish a critic review (larger XP grant).
    Publish {
        #[clap(long)]
        critic: i64,
        #[clap(long)]
        content: i64,
        #[clap(long)]
        body: String,
        #[clap(long)]
        rating: Option<f64>,
        #[clap(long)]
        aspects: Option<String>,
        #[clap(long)]
        emotions: Option<String>,
    },
    /// List reviews for a content item.
    List {
        #[clap(long)]
        content: i64,
    },
    /// List reviews by a user.
    ByUser {
        #[clap(long)]
        user: i64,
    },
}

fn parse_json_arg(field: &str, raw: Option<String>) -> Result<Option<JsonValue>, EngineError> {
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| EngineError::ValidationError(format!("invalid {} JSON: {}", field, e))),
    }
}

pub fn run_review_cli(
    store: &Store,
    config: &EngineConfig,
    cli: ReviewCli,
) -> Result<(), EngineError> {
    match cli.command {
        ReviewCommand::Add {
            user,
            content,
            body,
            rating,
            aspects,
            emotions,
        } => {
            let ingestor = ReviewIngestor::with_defaults(store, config);
            let receipt = ingestor.submit_viewer_review(
                user,
                ReviewPayload {
                    content_id: Some(content),
                    body,
                    aspects: parse_json_arg("aspects", aspects)?,
                    emotions: parse_json_arg("emotions", emotions)?,
                    rating,
                },
            )?;
            print_receipt("review.add", &receipt)?;
        }
        ReviewCommand::Publish {
            critic,
            content,
            body,
            rating,
            aspects,
            emotions,
        } => {
            let ingestor = ReviewIngestor::with_defaults(store, config);
            let receipt = ingestor.submit_critic_review(
                critic,
                ReviewPayload {
                    content_id: Some(content),
                    body,
                    aspects: parse_json_arg("aspects", aspects)?,
                    emotions: parse_json_arg("emotions", emotions)?,
                    rating,
                },
            )?;
            print_receipt("review.publish", &receipt)?;
        }
        ReviewCommand::List { content } => {
            for r in reviews_by_content(store, content)? {
                println!(
                    "{}  {}  rating={}  +{}/-{}  {}",
                    r.id,
                    r.username.as_deref().unwrap_or("?"),
                    r.rating.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    r.likes,
                    r.dislikes,
                    output::compact_line(&r.body, 72)
                );
            }
        }
        ReviewCommand::ByUser { user } => {
            for r in reviews_by_user(store, user)? {
                println!(
                    "{}  content={}  rating={}  {}",
                    r.id,
                    r.content_id.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    r.rating.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    output::compact_line(&r.body, 72)
                );
            }
        }
    }
    Ok(())
}

fn print_receipt(cmd: &str, receipt: &SubmitReceipt) -> Result<(), EngineError> {
    println!(
        "{}",
        time::command_envelope(
            cmd,
            "ok",
            serde_json::to_value(receipt)
                .map_err(|e| EngineError::ValidationError(e.to_string()))?
        )
    );
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "review",
        "version": "0.1.0",
        "description": "Review ingestion with layered primary/fallback write path",
        "commands": [
            { "name": "add", "parameters": ["user", "content", "body", "rating", "aspects", "emotions"] },
            { "name": "publish", "parameters": ["critic", "content", "body", "rating", "aspects", "emotions"] },
            { "name": "list", "parameters": ["content"] },
            { "name": "by-user", "parameters": ["user"] }
        ],
        "storage": ["catalog.db"]
    })
}
