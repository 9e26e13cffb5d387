use reelscore::core::broker::DbBroker;
use reelscore::core::db;
use reelscore::core::schemas;
use reelscore::core::store::Store;
use reelscore::engine::reconcile::{
    column_metadata, ensure_columns, ensure_table, relax_required_columns, table_exists,
};
use tempfile::tempdir;

fn with_conn<R>(
    store: &Store,
    f: impl FnOnce(&rusqlite::Connection) -> Result<R, reelscore::core::error::EngineError>,
) -> R {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    broker
        .with_conn(&db_path, "test", "test.reconcile", f)
        .expect("broker op")
}

#[test]
fn ensure_table_is_idempotent() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        conn.execute(
            "INSERT INTO reviews(id, content_id, user_id, body, created_at)
             VALUES('r1', 1, 1, 'kept', '0Z')",
            [],
        )?;

        // Already exists; calling twice must not raise or reset anything.
        ensure_table(conn, schemas::REVIEWS_TABLE);
        ensure_table(conn, schemas::REVIEWS_TABLE);

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?;
        assert_eq!(count, 1);
        Ok(())
    });
}

#[test]
fn ensure_table_creates_from_scratch() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        conn.execute("DROP TABLE review_votes", [])?;
        assert!(!table_exists(conn, schemas::REVIEW_VOTES_TABLE));

        ensure_table(conn, schemas::REVIEW_VOTES_TABLE);
        assert!(table_exists(conn, schemas::REVIEW_VOTES_TABLE));
        Ok(())
    });
}

#[test]
fn ensure_columns_adds_only_what_is_absent() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        conn.execute("ALTER TABLE reviews DROP COLUMN aspects", [])?;
        conn.execute("ALTER TABLE reviews DROP COLUMN emotions", [])?;

        ensure_columns(conn, schemas::REVIEWS_TABLE, schemas::REVIEWS_COLUMNS);

        let meta = column_metadata(conn, schemas::REVIEWS_TABLE);
        assert!(meta.contains_key("aspects"));
        assert!(meta.contains_key("emotions"));
        // Existing column types are untouched.
        assert_eq!(meta["rating"].col_type, "REAL");
        assert_eq!(meta["user_id"].col_type, "INTEGER");
        Ok(())
    });
}

#[test]
fn column_metadata_reports_nullability_and_defaults() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        let meta = column_metadata(conn, schemas::CONTENT_TABLE);
        assert!(!meta["title"].nullable);
        assert!(meta["emotional_cloud"].nullable);
        assert_eq!(meta["reviews_count"].default.as_deref(), Some("0"));
        Ok(())
    });
}

#[test]
fn column_metadata_ensures_a_missing_table_first() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        conn.execute("DROP TABLE reviews", [])?;
        let meta = column_metadata(conn, schemas::REVIEWS_TABLE);
        assert!(meta.contains_key("id"));
        assert!(meta.contains_key("rating"));
        Ok(())
    });
}

#[test]
fn relax_loosens_unprotected_not_null_columns_only() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        conn.execute("DROP TABLE reviews", [])?;
        conn.execute(
            "CREATE TABLE reviews (
                id TEXT PRIMARY KEY,
                content_id INTEGER,
                movie_id INTEGER,
                user_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                aspects TEXT,
                emotions TEXT,
                rating REAL,
                created_at TEXT NOT NULL DEFAULT '0Z',
                moderation_state TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "INSERT INTO reviews(id, user_id, body, moderation_state)
             VALUES('r1', 1, 'kept across rebuild', 'PENDING')",
            [],
        )?;

        relax_required_columns(
            conn,
            schemas::REVIEWS_TABLE,
            schemas::REVIEWS_PROTECTED_COLUMNS,
        );

        let meta = column_metadata(conn, schemas::REVIEWS_TABLE);
        // The stray strict column is now nullable.
        assert!(meta["moderation_state"].nullable);
        // Protected columns keep their constraints.
        assert!(!meta["user_id"].nullable);
        assert!(!meta["body"].nullable);
        // Columns with a default are left alone.
        assert!(!meta["created_at"].nullable);
        assert_eq!(meta["created_at"].default.as_deref(), Some("'0Z'"));

        // Rows survive the rebuild.
        let (body, state): (String, String) = conn.query_row(
            "SELECT body, moderation_state FROM reviews WHERE id = 'r1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!(body, "kept across rebuild");
        assert_eq!(state, "PENDING");

        // An insert omitting the relaxed column now succeeds.
        conn.execute(
            "INSERT INTO reviews(id, user_id, body) VALUES('r2', 1, 'no state')",
            [],
        )?;
        Ok(())
    });
}

#[test]
fn relax_is_a_noop_when_nothing_qualifies() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    with_conn(&store, |conn| {
        let before = column_metadata(conn, schemas::REVIEWS_TABLE);
        relax_required_columns(
            conn,
            schemas::REVIEWS_TABLE,
            schemas::REVIEWS_PROTECTED_COLUMNS,
        );
        let after = column_metadata(conn, schemas::REVIEWS_TABLE);
        assert_eq!(before.len(), after.len());
        for (name, meta) in before {
            assert_eq!(after[&name], meta);
        }
        Ok(())
    });
}
