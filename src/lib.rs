//! Reelscore: the review & rating aggregation engine of a content-review
//! platform (movies, series, games).
//!
//! The engine accepts viewer and critic reviews, keeps one toggleable vote
//! per (user, review), recomputes derived content-level rating aggregates
//! after every review mutation, fires gamification achievement checks,
//! records outbound review events in an outbox, and handles admin
//! moderation — all against a shared SQLite catalog store.
//!
//! # Write discipline
//!
//! - **Layered write path**: submissions first take a strict transactional
//!   insert; on any failure the fallback reconciles the schema and inserts
//!   through the columns actually present, with one targeted
//!   repair-and-retry on unknown-column errors.
//! - **Thin waist**: every mutation routes through [`core::broker::DbBroker`],
//!   which serializes write access per database and appends one audit
//!   event per operation to `broker.events.jsonl`.
//! - **Derived, never patched**: rating aggregates are recomputed in full
//!   from the review set, so concurrent recomputes converge.
//! - **Deployment-time migrations**: schema changes ship in
//!   [`core::migration`]; runtime reconciliation exists only as the
//!   fallback repair layer.
//!
//! # Crate structure
//!
//! - [`core`]: store plumbing (connections, broker, pool, migrations,
//!   config, errors).
//! - [`engine`]: the subsystems (reviews, votes, ratings, gamification,
//!   moderation, events, reconcile).

pub mod core;
pub mod engine;
mod subsystems;

use crate::core::config::EngineConfig;
use crate::core::store::Store;
use crate::engine::{catalog, events, gamification, moderation, ratings, reconcile, reviews, votes};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "reelscore",
    version = env!("CARGO_PKG_VERSION"),
    about = "Review & rating aggregation engine"
)]
struct Cli {
    /// Store root directory (defaults to the configured data_dir).
    #[clap(long, global = true)]
    root: Option<PathBuf>,
    /// Path to reelscore.toml (defaults to the working directory).
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the store: create tables, seed achievements, run
    /// pending migrations.
    Init,
    /// Submit and browse reviews.
    Review(reviews::ReviewCli),
    /// Cast and inspect review votes.
    Vote(votes::VoteCli),
    /// Recompute and inspect content rating aggregates.
    Rating(ratings::RatingCli),
    /// Admin moderation actions.
    Moderate(moderation::ModerationCli),
    /// Inspect achievement definitions and awards.
    Achievements(gamification::GamificationCli),
    /// Inspect and drain the review event outbox.
    Events(events::EventsCli),
    /// Inspect and repair the store layout.
    Schema(reconcile::SchemaCli),
    /// Seed the catalog surface for local development.
    Catalog(catalog::CatalogCli),
    /// Print the machine-readable subsystem registry.
    Capabilities,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref())?;
    let root = cli.root.clone().unwrap_or_else(|| config.data_dir.clone());

    if let Command::Capabilities = cli.command {
        let registry = serde_json::json!({
            "subsystems": [
                reviews::schema(),
                votes::schema(),
                ratings::schema(),
                gamification::schema(),
                moderation::schema(),
                events::schema(),
                reconcile::schema(),
                catalog::schema(),
                crate::core::broker::schema(),
            ]
        });
        println!("{}", serde_json::to_string_pretty(&registry)?);
        return Ok(());
    }

    let store = Store::open(&root)?;

    match cli.command {
        Command::Init => {
            println!(
                "{} store ready at {}",
                "✓".bright_green(),
                store.root.display().to_string().bright_white()
            );
        }
        Command::Review(sub) => reviews::run_review_cli(&store, &config, sub)?,
        Command::Vote(sub) => votes::run_vote_cli(&store, sub)?,
        Command::Rating(sub) => ratings::run_rating_cli(&store, sub)?,
        Command::Moderate(sub) => moderation::run_moderation_cli(&store, sub)?,
        Command::Achievements(sub) => gamification::run_gamification_cli(&store, sub)?,
        Command::Events(sub) => events::run_events_cli(&store, sub)?,
        Command::Schema(sub) => reconcile::run_schema_cli(&store, sub)?,
        Command::Catalog(sub) => catalog::run_catalog_cli(&store, sub)?,
        Command::Capabilities => unreachable!("handled above"),
    }

    Ok(())
}
