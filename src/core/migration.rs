//! Version detection and deployment-time schema migrations.
//!
//! Schema changes ship as versioned migrations applied when the store is
//! opened after an upgrade — runtime reconciliation (`engine::reconcile`)
//! is strictly the fallback repair layer, not the way schema evolves.
//!
//! - Version mismatch triggers migration; `generated/engine.version`
//!   tracks the last version that ran.
//! - Every migration must be idempotent (safe to run multiple times).

use crate::core::{db, error};
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Current engine version from Cargo.toml.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path to version file relative to the store root.
const VERSION_FILE: &str = "generated/engine.version";

pub struct Migration {
    /// Version this migration targets (e.g. "0.3.0").
    pub target_version: &'static str,
    pub description: &'static str,
    pub up: fn(&Path) -> Result<(), error::EngineError>,
}

/// All migrations in chronological order by version.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            target_version: "0.3.0",
            description: "Backfill content_id from legacy movie_id on reviews",
            up: migrate_backfill_content_id,
        },
        Migration {
            target_version: "0.4.0",
            description: "Add review_id index to review_votes",
            up: migrate_add_votes_index,
        },
    ]
}

/// Check if migration is needed and run if necessary.
pub fn check_and_migrate(root: &Path) -> Result<(), error::EngineError> {
    let version_path = root.join(VERSION_FILE);

    let stored_version = if version_path.exists() {
        fs::read_to_string(&version_path)
            .map_err(error::EngineError::IoError)?
            .trim()
            .to_string()
    } else {
        String::new()
    };

    if stored_version == ENGINE_VERSION {
        return Ok(());
    }

    run_migrations(root, &stored_version)?;
    write_version(root)?;

    Ok(())
}

fn run_migrations(root: &Path, from_version: &str) -> Result<(), error::EngineError> {
    let mut applied = 0;
    for migration in all_migrations() {
        if should_run_migration(from_version, migration.target_version) {
            println!(
                "  {} {}",
                "●".bright_cyan(),
                migration.description.bright_white()
            );
            (migration.up)(root)?;
            applied += 1;
        }
    }

    if applied > 0 {
        println!(
            "  {} {} migration(s) applied ({} → {})",
            "✓".bright_green(),
            applied,
            if from_version.is_empty() { "fresh" } else { from_version },
            ENGINE_VERSION.bright_green()
        );
    }

    Ok(())
}

/// Fresh installs get the full current schema from the initializers and
/// skip historical migrations; upgrades run everything past their version.
fn should_run_migration(from: &str, target: &str) -> bool {
    if from.is_empty() {
        return false;
    }
    from < target
}

pub fn write_version(root: &Path) -> Result<(), error::EngineError> {
    let version_path = root.join(VERSION_FILE);
    if let Some(parent) = version_path.parent() {
        fs::create_dir_all(parent).map_err(error::EngineError::IoError)?;
    }
    fs::write(&version_path, ENGINE_VERSION).map_err(error::EngineError::IoError)?;
    Ok(())
}

/// The reviews table historically addressed content through `movie_id`;
/// `content_id` superseded it when series and games joined the catalog.
/// Both columns stay live, so older rows need the new column populated.
fn migrate_backfill_content_id(root: &Path) -> Result<(), error::EngineError> {
    let db_path = db::catalog_db_path(root);
    if !db_path.exists() {
        return Ok(());
    }

    let conn = db::db_connect(&db_path.to_string_lossy())?;

    let has_content_id: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('reviews') WHERE name='content_id'",
        [],
        |row| row.get(0),
    )?;
    if has_content_id == 0 {
        conn.execute("ALTER TABLE reviews ADD COLUMN content_id INTEGER", [])?;
    }

    conn.execute(
        "UPDATE reviews SET content_id = movie_id WHERE content_id IS NULL AND movie_id IS NOT NULL",
        [],
    )?;
    Ok(())
}

fn migrate_add_votes_index(root: &Path) -> Result<(), error::EngineError> {
    let db_path = db::catalog_db_path(root);
    if !db_path.exists() {
        return Ok(());
    }

    let conn = db::db_connect(&db_path.to_string_lossy())?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_votes_review ON review_votes(review_id)",
        [],
    )?;
    Ok(())
}
