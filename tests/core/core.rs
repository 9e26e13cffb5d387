use reelscore::core::broker::{self, BrokerEvent, DbBroker};
use reelscore::core::db;
use reelscore::core::error::EngineError;
use reelscore::core::migration;
use reelscore::core::store::Store;
use rusqlite::params;
use std::fs;
use std::sync::{Arc, Barrier};
use tempfile::tempdir;

#[test]
fn store_open_creates_db_with_pragmas_and_version() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store open");

    let db_path = db::catalog_db_path(&store.root);
    assert!(db_path.exists());

    let conn = db::db_connect(&db_path.to_string_lossy()).expect("db connect");
    let fk_on: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("pragma foreign_keys");
    assert_eq!(fk_on, 1);
    let journal: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .expect("pragma journal_mode");
    assert_eq!(journal.to_lowercase(), "wal");

    // Migrations stamp the engine version on open.
    let version = fs::read_to_string(tmp.path().join("generated/engine.version")).unwrap();
    assert_eq!(version.trim(), migration::ENGINE_VERSION);

    // Opening again is safe and changes nothing structural.
    Store::open(tmp.path()).expect("reopen");
}

#[test]
fn broker_round_trip_and_audit() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store open");
    let db_path = db::catalog_db_path(&store.root);

    let broker = DbBroker::new(&store.root);
    broker
        .with_conn(&db_path, "tester", "content.insert", |conn| {
            conn.execute(
                "INSERT INTO content(id, title, kind, updated_at) VALUES(?1, ?2, ?3, ?4)",
                params![42, "Audit Trail", "MOVIE", "0Z"],
            )
            .map_err(EngineError::RusqliteError)?;
            Ok(())
        })
        .expect("broker success path");

    let result: Result<(), EngineError> = broker.with_conn(&db_path, "tester", "content.fail", |_| {
        Err(EngineError::ValidationError("intentional".to_string()))
    });
    assert!(result.is_err());

    let audit_path = store.root.join("broker.events.jsonl");
    assert!(audit_path.exists());
    let events: Vec<BrokerEvent> = fs::read_to_string(&audit_path)
        .expect("read audit")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid broker event json"))
        .collect();
    assert!(events
        .iter()
        .any(|ev| ev.op == "content.insert" && ev.status == "success"));
    assert!(events
        .iter()
        .any(|ev| ev.op == "content.fail" && ev.status == "error"));
    assert!(events.iter().all(|ev| !ev.event_id.is_empty()));

    let schema = broker::schema();
    assert_eq!(schema["name"], "broker");
}

#[test]
fn broker_serializes_concurrent_writes_to_one_db() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store open");
    let db_path = db::catalog_db_path(&store.root);

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for i in 0..4 {
        let barrier = Arc::clone(&barrier);
        let root = store.root.clone();
        let db_path = db_path.clone();
        handles.push(std::thread::spawn(move || {
            barrier.wait();
            let broker = DbBroker::new(&root);
            broker
                .with_conn(&db_path, "tester", "content.insert", |conn| {
                    conn.execute(
                        "INSERT INTO content(id, title, kind, updated_at) VALUES(?1, ?2, 'MOVIE', '0Z')",
                        params![100 + i, format!("Title {}", i)],
                    )
                    .map_err(EngineError::RusqliteError)?;
                    Ok(())
                })
                .expect("concurrent write");
        }));
    }
    for h in handles {
        h.join().expect("thread join");
    }

    let conn = db::db_connect(&db_path.to_string_lossy()).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM content WHERE id >= 100", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(count, 4);
}

#[test]
fn migration_backfills_content_id_from_legacy_rows() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::open(tmp.path()).expect("store open");
    let db_path = db::catalog_db_path(&store.root);

    // Simulate a store written by a pre-alias deployment.
    {
        let conn = db::db_connect(&db_path.to_string_lossy()).unwrap();
        conn.execute(
            "INSERT INTO reviews(id, movie_id, user_id, body, created_at)
             VALUES('old-1', 7, 1, 'pre-alias row', '0Z')",
            [],
        )
        .unwrap();
    }
    fs::write(tmp.path().join("generated/engine.version"), "0.2.0").unwrap();

    migration::check_and_migrate(tmp.path()).expect("migrate");

    let conn = db::db_connect(&db_path.to_string_lossy()).unwrap();
    let content_id: i64 = conn
        .query_row(
            "SELECT content_id FROM reviews WHERE id = 'old-1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(content_id, 7);

    let version = fs::read_to_string(tmp.path().join("generated/engine.version")).unwrap();
    assert_eq!(version.trim(), migration::ENGINE_VERSION);
}
