use reelscore::core::broker::DbBroker;
use reelscore::core::config::EngineConfig;
use reelscore::core::db;
use reelscore::core::store::Store;
use reelscore::engine::catalog;
use reelscore::engine::moderation::{delete_review, ModerationStatus};
use reelscore::engine::ratings::aggregates;
use reelscore::engine::reviews::{reviews_by_content, ReviewIngestor, ReviewPayload};
use tempfile::tempdir;

fn seeded_store(root: &std::path::Path) -> (Store, EngineConfig) {
    let store = Store::open(root).expect("store open");
    catalog::add_content(&store, 10, "The Long Cut", "MOVIE").unwrap();
    catalog::add_user(&store, 1, "viewer_one", "USER").unwrap();
    (store, EngineConfig::default())
}

fn submit_one(store: &Store, config: &EngineConfig) -> String {
    let ingestor = ReviewIngestor::with_defaults(store, config);
    ingestor
        .submit_viewer_review(
            1,
            ReviewPayload {
                content_id: Some(10),
                body: "to be removed".to_string(),
                rating: Some(9.0),
                ..Default::default()
            },
        )
        .unwrap()
        .review_id
}

fn raw_exec(store: &Store, sql: &str) {
    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    broker
        .with_conn(&db_path, "test", "test.raw", |conn| {
            conn.execute(sql, [])?;
            Ok(())
        })
        .expect("raw exec");
}

#[test]
fn deleting_a_review_recomputes_aggregates_and_leaves_an_audit_row() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());
    let review_id = submit_one(&store, &config);

    let before = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(before.reviews_count, 1);

    let receipt = delete_review(&store, &review_id, 99, "spam").unwrap();
    assert_eq!(receipt.status, ModerationStatus::Deleted);

    assert!(reviews_by_content(&store, 10).unwrap().is_empty());
    let after = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(after.reviews_count, 0);
    assert_eq!(after.avg_rating, 0.0);

    let broker = DbBroker::new(&store.root);
    let db_path = db::catalog_db_path(&store.root);
    let (logged_reason, body_sha256): (String, String) = broker
        .with_read(&db_path, |conn| {
            let row = conn.query_row(
                "SELECT reason, body_sha256 FROM moderation_log WHERE review_id = ?1",
                rusqlite::params![review_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(row)
        })
        .unwrap();
    assert_eq!(logged_reason, "spam");
    assert_eq!(body_sha256.len(), 64);
}

#[test]
fn deleting_a_nonexistent_review_is_a_deterministic_noop() {
    let tmp = tempdir().unwrap();
    let (store, _config) = seeded_store(tmp.path());

    let receipt = delete_review(&store, "no-such-review", 99, "spam").unwrap();
    assert_eq!(receipt.status, ModerationStatus::Noop);

    // Repeatable: same answer every time, never an error.
    let receipt = delete_review(&store, "no-such-review", 99, "spam").unwrap();
    assert_eq!(receipt.status, ModerationStatus::Noop);
}

#[test]
fn missing_audit_table_falls_back_to_direct_delete() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());
    let review_id = submit_one(&store, &config);

    raw_exec(&store, "DROP TABLE moderation_log");

    let receipt = delete_review(&store, &review_id, 99, "spam").unwrap();
    assert_eq!(receipt.status, ModerationStatus::Deleted);
    assert!(reviews_by_content(&store, 10).unwrap().is_empty());
}

#[test]
fn missing_reviews_table_is_repaired_and_reported_noop() {
    let tmp = tempdir().unwrap();
    let (store, _config) = seeded_store(tmp.path());

    raw_exec(&store, "DROP TABLE reviews");

    let receipt = delete_review(&store, "whatever", 99, "spam").unwrap();
    assert_eq!(receipt.status, ModerationStatus::Noop);

    // The table exists again afterward.
    assert!(reviews_by_content(&store, 10).unwrap().is_empty());
}
