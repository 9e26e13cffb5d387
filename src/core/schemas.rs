//! Centralized database schema definitions for the catalog store.
//!
//! Everything lives in one SQLite database, `catalog.db` — the aggregate
//! recompute and the critic/audience split join reviews against users and
//! content, so splitting tables across files is not an option. Tables:
//!
//! 1. reviews / review_votes: the engine's own write surface.
//! 2. content / users: the catalog surface the engine consumes and projects
//!    aggregates onto.
//! 3. achievements / user_achievements: gamification thresholds and awards.
//! 4. moderation_log: audit rows for admin deletions.
//! 5. review_events: outbox for outbound analytics events.

pub const CATALOG_DB_NAME: &str = "catalog.db";

/// A column the reconciler knows how to restore: name plus the ADD COLUMN
/// DDL fragment (name included).
pub struct ColumnSpec {
    pub name: &'static str,
    pub ddl: &'static str,
}

// --- 1. Review surface ---

pub const REVIEWS_TABLE: &str = "reviews";

pub const REVIEWS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        content_id INTEGER,
        movie_id INTEGER,
        user_id INTEGER NOT NULL,
        body TEXT NOT NULL,
        aspects TEXT,
        emotions TEXT,
        rating REAL,
        created_at TEXT NOT NULL DEFAULT (strftime('%s','now') || 'Z')
    )
";
pub const REVIEWS_INDEX_CONTENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_reviews_content ON reviews(content_id)";
pub const REVIEWS_INDEX_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id)";

/// Columns the fallback insert path may restore one by one.
/// `content_id` and `movie_id` are the two historically-aliased names for
/// the same logical content reference; both are kept live.
pub const REVIEWS_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "content_id", ddl: "content_id INTEGER" },
    ColumnSpec { name: "movie_id", ddl: "movie_id INTEGER" },
    ColumnSpec { name: "user_id", ddl: "user_id INTEGER" },
    ColumnSpec { name: "body", ddl: "body TEXT" },
    ColumnSpec { name: "aspects", ddl: "aspects TEXT" },
    ColumnSpec { name: "emotions", ddl: "emotions TEXT" },
    ColumnSpec { name: "rating", ddl: "rating REAL" },
    ColumnSpec { name: "created_at", ddl: "created_at TEXT" },
];

/// Columns the relaxation pass must never touch: identifier, author, body,
/// and both content reference aliases.
pub const REVIEWS_PROTECTED_COLUMNS: &[&str] =
    &["id", "user_id", "body", "content_id", "movie_id"];

pub const REVIEW_VOTES_TABLE: &str = "review_votes";

pub const REVIEW_VOTES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS review_votes (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        review_id TEXT NOT NULL,
        vote_kind TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%s','now') || 'Z'),
        UNIQUE(user_id, review_id)
    )
";
pub const REVIEW_VOTES_INDEX_REVIEW: &str =
    "CREATE INDEX IF NOT EXISTS idx_votes_review ON review_votes(review_id)";

pub const REVIEW_VOTES_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "user_id", ddl: "user_id INTEGER" },
    ColumnSpec { name: "review_id", ddl: "review_id TEXT" },
    ColumnSpec { name: "vote_kind", ddl: "vote_kind TEXT" },
    ColumnSpec { name: "created_at", ddl: "created_at TEXT" },
];

// --- 2. Catalog surface ---

pub const CONTENT_TABLE: &str = "content";

pub const CONTENT_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS content (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'MOVIE',
        avg_rating REAL DEFAULT 0,
        critics_rating REAL DEFAULT 0,
        audience_rating REAL DEFAULT 0,
        reviews_count INTEGER DEFAULT 0,
        hype_index INTEGER DEFAULT 0,
        emotional_cloud TEXT,
        perception_map TEXT,
        updated_at TEXT
    )
";

/// The aggregate columns this engine writes, plus the display columns it
/// only tolerates (hype_index, emotional_cloud, perception_map).
pub const CONTENT_AGGREGATE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "avg_rating", ddl: "avg_rating REAL DEFAULT 0" },
    ColumnSpec { name: "critics_rating", ddl: "critics_rating REAL DEFAULT 0" },
    ColumnSpec { name: "audience_rating", ddl: "audience_rating REAL DEFAULT 0" },
    ColumnSpec { name: "reviews_count", ddl: "reviews_count INTEGER DEFAULT 0" },
    ColumnSpec { name: "hype_index", ddl: "hype_index INTEGER DEFAULT 0" },
    ColumnSpec { name: "emotional_cloud", ddl: "emotional_cloud TEXT" },
    ColumnSpec { name: "perception_map", ddl: "perception_map TEXT" },
];

pub const USERS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'USER',
        xp INTEGER NOT NULL DEFAULT 0
    )
";

// --- 3. Gamification ---

pub const ACHIEVEMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS achievements (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL,
        metric TEXT NOT NULL,
        threshold REAL NOT NULL,
        cmp TEXT NOT NULL DEFAULT 'gte',
        xp_reward INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
";

pub const USER_ACHIEVEMENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS user_achievements (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        achievement_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(user_id, achievement_id)
    )
";

// --- 4. Moderation ---

pub const MODERATION_LOG_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS moderation_log (
        id TEXT PRIMARY KEY,
        review_id TEXT NOT NULL,
        moderator_id INTEGER NOT NULL,
        reason TEXT NOT NULL,
        body_sha256 TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

// --- 5. Outbox ---

pub const REVIEW_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS review_events (
        id TEXT PRIMARY KEY,
        event_type TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        content_id INTEGER,
        content_kind TEXT NOT NULL DEFAULT 'UNKNOWN',
        rating REAL,
        emotions TEXT,
        aspects TEXT,
        created_at TEXT NOT NULL,
        dispatched_at TEXT
    )
";
pub const REVIEW_EVENTS_INDEX_PENDING: &str =
    "CREATE INDEX IF NOT EXISTS idx_review_events_pending ON review_events(dispatched_at)";
