use reelscore::core::config::EngineConfig;
use reelscore::core::store::Store;
use reelscore::engine::catalog;
use reelscore::engine::ratings::{aggregates, recompute};
use reelscore::engine::reviews::{ReviewIngestor, ReviewPayload};
use tempfile::tempdir;

fn seeded_store(root: &std::path::Path) -> (Store, EngineConfig) {
    let store = Store::open(root).expect("store open");
    catalog::add_content(&store, 10, "The Long Cut", "MOVIE").unwrap();
    catalog::add_user(&store, 1, "viewer_one", "USER").unwrap();
    catalog::add_user(&store, 2, "viewer_two", "USER").unwrap();
    catalog::add_user(&store, 3, "viewer_three", "USER").unwrap();
    catalog::add_user(&store, 9, "pro_critic", "CRITIC").unwrap();
    (store, EngineConfig::default())
}

fn submit(store: &Store, config: &EngineConfig, user: i64, rating: f64) {
    let ingestor = ReviewIngestor::with_defaults(store, config);
    ingestor
        .submit_viewer_review(
            user,
            ReviewPayload {
                content_id: Some(10),
                body: format!("review by {}", user),
                rating: Some(rating),
                ..Default::default()
            },
        )
        .expect("submit");
}

#[test]
fn audience_only_reviews_average_into_all_fields() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());

    submit(&store, &config, 1, 6.0);
    submit(&store, &config, 2, 8.0);
    submit(&store, &config, 3, 10.0);

    let agg = aggregates(&store, 10).unwrap().expect("content present");
    assert_eq!(agg.avg_rating, 8.0);
    assert_eq!(agg.audience_rating, 8.0);
    assert_eq!(agg.critics_rating, 0.0);
    assert_eq!(agg.reviews_count, 3);
}

#[test]
fn critic_and_audience_subsets_split() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());

    let ingestor = ReviewIngestor::with_defaults(&store, &config);
    ingestor
        .submit_critic_review(
            9,
            ReviewPayload {
                content_id: Some(10),
                body: "measured but hollow".to_string(),
                rating: Some(4.0),
                ..Default::default()
            },
        )
        .unwrap();
    submit(&store, &config, 1, 9.0);

    let agg = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(agg.critics_rating, 4.0);
    assert_eq!(agg.audience_rating, 9.0);
    assert_eq!(agg.avg_rating, 6.5);
    assert_eq!(agg.reviews_count, 2);
}

#[test]
fn recompute_is_idempotent() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());

    submit(&store, &config, 1, 7.5);
    submit(&store, &config, 2, 8.5);

    recompute(&store, Some(10)).unwrap();
    let first = aggregates(&store, 10).unwrap().unwrap();
    recompute(&store, Some(10)).unwrap();
    let second = aggregates(&store, 10).unwrap().unwrap();

    assert_eq!(first.avg_rating, second.avg_rating);
    assert_eq!(first.critics_rating, second.critics_rating);
    assert_eq!(first.audience_rating, second.audience_rating);
    assert_eq!(first.reviews_count, second.reviews_count);
}

#[test]
fn zero_review_content_has_zero_aggregates_not_null() {
    let tmp = tempdir().unwrap();
    let (store, _config) = seeded_store(tmp.path());

    recompute(&store, Some(10)).unwrap();

    let agg = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(agg.avg_rating, 0.0);
    assert_eq!(agg.critics_rating, 0.0);
    assert_eq!(agg.audience_rating, 0.0);
    assert_eq!(agg.reviews_count, 0);
}

#[test]
fn absent_content_id_is_a_noop() {
    let tmp = tempdir().unwrap();
    let (store, _config) = seeded_store(tmp.path());

    recompute(&store, None).unwrap();
}

#[test]
fn unrated_reviews_do_not_count() {
    let tmp = tempdir().unwrap();
    let (store, config) = seeded_store(tmp.path());

    let ingestor = ReviewIngestor::with_defaults(&store, &config);
    ingestor
        .submit_viewer_review(
            1,
            ReviewPayload {
                content_id: Some(10),
                body: "no number, just feelings".to_string(),
                rating: None,
                ..Default::default()
            },
        )
        .unwrap();
    submit(&store, &config, 2, 8.0);

    let agg = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(agg.reviews_count, 1);
    assert_eq!(agg.avg_rating, 8.0);
}

#[test]
fn legacy_movie_id_rows_resolve_to_the_same_content() {
    let tmp = tempdir().unwrap();
    let (store, _config) = seeded_store(tmp.path());

    // A row written by an older deployment: movie_id set, content_id not.
    let broker = reelscore::core::broker::DbBroker::new(&store.root);
    let db_path = reelscore::core::db::catalog_db_path(&store.root);
    broker
        .with_conn(&db_path, "test", "seed.legacy", |conn| {
            conn.execute(
                "INSERT INTO reviews(id, movie_id, user_id, body, rating, created_at)
                 VALUES('legacy-1', 10, 1, 'older row', 6.0, '0Z')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    recompute(&store, Some(10)).unwrap();
    let agg = aggregates(&store, 10).unwrap().unwrap();
    assert_eq!(agg.reviews_count, 1);
    assert_eq!(agg.avg_rating, 6.0);
}
