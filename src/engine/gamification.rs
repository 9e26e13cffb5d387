//! Achievement triggers and XP awards.
//!
//! The ingestor consumes this through the `AchievementTrigger` trait — the
//! engine proper only depends on the calling contract and the three metric
//! names. The shipped implementation stores threshold rows in SQLite and
//! records awards under UNIQUE(user_id, achievement_id) with
//! `INSERT OR IGNORE`, so a re-run of the same check (e.g. after the
//! fallback write path retries) can never double-award.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Metric {
    ReviewCount,
    ReviewLength,
    RatingValue,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::ReviewCount => "review_count",
            Metric::ReviewLength => "review_length",
            Metric::RatingValue => "rating_value",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metric: String,
    pub threshold: f64,
    pub cmp: String,
    pub xp_reward: i64,
}

/// Gamification collaborator interface consumed by the review ingestor.
pub trait AchievementTrigger {
    /// Evaluate `metric` at `value` for the user and return the
    /// achievements newly unlocked by this call.
    fn check_and_award(
        &self,
        store: &Store,
        user_id: i64,
        metric: Metric,
        value: f64,
    ) -> Result<Vec<Achievement>, error::EngineError>;

    /// Grant a flat XP amount.
    fn award_xp(&self, store: &Store, user_id: i64, amount: i64)
        -> Result<(), error::EngineError>;
}

pub fn initialize_gamification_db(root: &Path) -> Result<(), error::EngineError> {
    let broker = DbBroker::new(root);
    let db_path = db::catalog_db_path(root);

    broker.with_conn(&db_path, "reelscore", "gamification.init", |conn| {
        conn.execute(schemas::USERS_SCHEMA, [])?;
        conn.execute(schemas::ACHIEVEMENTS_SCHEMA, [])?;
        conn.execute(schemas::USER_ACHIEVEMENTS_SCHEMA, [])?;
        seed_default_achievements(conn)?;
        Ok(())
    })
}

fn seed_default_achievements(conn: &Connection) -> Result<(), error::EngineError> {
    let achievements = vec![
        ("First Steps", "Publish your first review", "review_count", 1.0, "gte", 10),
        ("Film Buff", "Publish 10 reviews", "review_count", 10.0, "gte", 50),
        ("Resident Critic", "Publish 50 reviews", "review_count", 50.0, "gte", 200),
        ("Wordsmith", "Write a review of 500+ characters", "review_length", 500.0, "gte", 25),
        ("Perfectionist", "Award a perfect 10", "rating_value", 10.0, "eq", 15),
        ("Tough Crowd", "Rate something 2 or lower", "rating_value", 2.0, "lte_pos", 15),
    ];

    let ts = time::now_epoch_z();
    for (name, desc, metric, threshold, cmp, xp) in achievements {
        conn.execute(
            "INSERT OR IGNORE INTO achievements(id, name, description, metric, threshold, cmp, xp_reward, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![Ulid::new().to_string(), name, desc, metric, threshold, cmp, xp, ts],
        )?;
    }
    Ok(())
}

fn threshold_met(cmp: &str, threshold: f64, value: f64) -> bool {
    match cmp {
        "gte" => value >= threshold,
        "eq" => value == threshold,
        "lte_pos" => value <= threshold && value > 0.0,
        _ => false,
    }
}

/// SQLite-backed trigger implementation.
pub struct SqliteGamification;

impl AchievementTrigger for SqliteGamification {
    fn check_and_award(
        &self,
        store: &Store,
        user_id: i64,
        metric: Metric,
        value: f64,
    ) -> Result<Vec<Achievement>, error::EngineError> {
        let broker = DbBroker::new(&store.root);
        let db_path = db::catalog_db_path(&store.root);

        broker.with_conn(&db_path, "reelscore", "gamification.check", |conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.name, a.description, a.metric, a.threshold, a.cmp, a.xp_reward
                 FROM achievements a
                 WHERE a.metric = ?1
                   AND a.id NOT IN (
                       SELECT achievement_id FROM user_achievements WHERE user_id = ?2
                   )",
            )?;
            let candidates = stmt
                .query_map(params![metric.as_str(), user_id], |row| {
                    Ok(Achievement {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        metric: row.get(3)?,
                        threshold: row.get(4)?,
                        cmp: row.get(5)?,
                        xp_reward: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()
                .map_err(error::EngineError::RusqliteError)?;

            let mut unlocked = Vec::new();
            for achievement in candidates {
                if !threshold_met(&achievement.cmp, achievement.threshold, value) {
                    continue;
                }
                // INSERT OR IGNORE on the unique pair is what makes the
                // award idempotent under retried checks.
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO user_achievements(id, user_id, achievement_id, created_at)
                     VALUES(?1, ?2, ?3, ?4)",
                    params![
                        Ulid::new().to_string(),
                        user_id,
                        achievement.id,
                        time::now_epoch_z()
                    ],
                )?;
                if inserted > 0 {
                    conn.execute(
                        "UPDATE users SET xp = xp + ?1 WHERE id = ?2",
                        params![achievement.xp_reward, user_id],
                    )?;
                    unlocked.push(achievement);
                }
            }
            Ok(unlocked)
        })
    }

    fn award_xp(
        &self,
        store: &Store,
        user_id: i64,
        amount: i64,
    ) -> Result<(), error::EngineError> {
        let broker = DbBroker::new(&store.root);
        let db_path = db::catalog_db_path(&store.root);

        broker.with_conn(&db_path, "reelscore", "gamification.award_xp", |conn| {
            conn.execute(
                "UPDATE users SET xp = xp + ?1 WHERE id = ?2",
                params![amount, user_id],
            )?;
            Ok(())
        })
    }
}

/// Achievements already earned by one user.
pub fn achievements_for_user(
    store: &Store,
    user_id: i64,
) -> Result<Vec<Achievement>, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_read(&db_path, |conn| {
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.description, a.metric, a.threshold, a.cmp, a.xp_reward
             FROM achievements a
             JOIN user_achievements ua ON ua.achievement_id = a.id
             WHERE ua.user_id = ?1
             ORDER BY ua.created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(Achievement {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    metric: row.get(3)?,
                    threshold: row.get(4)?,
                    cmp: row.get(5)?,
                    xp_reward: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(error::EngineError::RusqliteError)?;
        Ok(rows)
    })
}

pub fn list_achievements(store: &Store) -> Result<Vec<Achievement>, error::EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_read(&db_path, |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, name, description, metric, threshold, cmp, xp_reward
             FROM achievements ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Achievement {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    metric: row.get(3)?,
                    threshold: row.get(4)?,
                    cmp: row.get(5)?,
                    xp_reward: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(error::EngineError::RusqliteError)?;
        Ok(rows)
    })
}

#[derive(Parser, Debug)]
#[clap(name = "achievements", about = "Inspect achievement definitions and awards.")]
pub struct GamificationCli {
    #[clap(subcommand)]
    pub command: GamificationCommand,
}

#[derive(Subcommand, Debug)]
pub enum GamificationCommand {
    /// List all achievement definitions.
    List,
    /// List achievements earned by a user.
    ForUser {
        #[clap(long)]
        user: i64,
    },
}

pub fn run_gamification_cli(store: &Store, cli: GamificationCli) -> Result<(), error::EngineError> {
    match cli.command {
        GamificationCommand::List => {
            for a in list_achievements(store)? {
                println!(
                    "{}  [{} {} {}]  +{} XP  — {}",
                    a.name, a.metric, a.cmp, a.threshold, a.xp_reward, a.description
                );
            }
        }
        GamificationCommand::ForUser { user } => {
            let earned = achievements_for_user(store, user)?;
            if earned.is_empty() {
                println!("No achievements for user {}", user);
            }
            for a in earned {
                println!("{}  (+{} XP)", a.name, a.xp_reward);
            }
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "achievements",
        "version": "0.1.0",
        "description": "Threshold-triggered achievements with idempotent awards",
        "commands": [
            { "name": "list" },
            { "name": "for-user", "parameters": ["user"] }
        ],
        "storage": ["catalog.db"]
    })
}
