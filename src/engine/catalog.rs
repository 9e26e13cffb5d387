//! Seed helpers for the catalog surface the engine consumes.
//!
//! Content items and users are owned by the wider platform; the engine
//! only needs enough of them to resolve the content reference, the
//! critic/audience split, and XP accrual. These helpers exist for the CLI
//! harness and local development.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::EngineError;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::params;

pub fn add_content(
    store: &Store,
    content_id: i64,
    title: &str,
    kind: &str,
) -> Result<(), EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_conn(&db_path, "reelscore", "catalog.add_content", |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO content(id, title, kind, updated_at) VALUES(?1, ?2, ?3, ?4)",
            params![content_id, title, kind, time::now_epoch_z()],
        )?;
        Ok(())
    })
}

pub fn add_user(
    store: &Store,
    user_id: i64,
    username: &str,
    role: &str,
) -> Result<(), EngineError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);

    broker.with_conn(&db_path, "reelscore", "catalog.add_user", |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO users(id, username, role) VALUES(?1, ?2, ?3)",
            params![user_id, username, role],
        )?;
        Ok(())
    })
}

#[derive(Parser, Debug)]
#[clap(name = "catalog", about = "Seed the catalog surface for local development.")]
pub struct CatalogCli {
    #[clap(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Register a content item.
    AddContent {
        #[clap(long)]
        id: i64,
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "MOVIE")]
        kind: String,
    },
    /// Register a user.
    AddUser {
        #[clap(long)]
        id: i64,
        #[clap(long)]
        username: String,
        #[clap(long, default_value = "USER")]
        role: String,
    },
}

pub fn run_catalog_cli(store: &Store, cli: CatalogCli) -> Result<(), EngineError> {
    match cli.command {
        CatalogCommand::AddContent { id, title, kind } => {
            add_content(store, id, &title, &kind)?;
            println!("Content registered: {} ({})", title, id);
        }
        CatalogCommand::AddUser { id, username, role } => {
            add_user(store, id, &username, &role)?;
            println!("User registered: {} ({})", username, id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "catalog",
        "version": "0.1.0",
        "description": "Development seed helpers for content and users",
        "commands": [
            { "name": "add-content", "parameters": ["id", "title", "kind"] },
            { "name": "add-user", "parameters": ["id", "username", "role"] }
        ],
        "storage": ["catalog.db"]
    })
}
