use reelscore::core::config::EngineConfig;
use reelscore::core::error::EngineError;
use reelscore::core::store::Store;
use reelscore::engine::catalog;
use reelscore::engine::events::{drain, enqueue_review_created, pending, EventSink, ReviewEvent};
use reelscore::engine::reviews::{ReviewIngestor, ReviewPayload};
use tempfile::tempdir;

struct CollectingSink {
    delivered: Vec<String>,
    fail_after: Option<usize>,
}

impl CollectingSink {
    fn new() -> Self {
        Self {
            delivered: Vec::new(),
            fail_after: None,
        }
    }

    fn failing_after(n: usize) -> Self {
        Self {
            delivered: Vec::new(),
            fail_after: Some(n),
        }
    }
}

impl EventSink for CollectingSink {
    fn deliver(&mut self, event: &ReviewEvent) -> Result<(), EngineError> {
        if let Some(limit) = self.fail_after {
            if self.delivered.len() >= limit {
                return Err(EngineError::ValidationError("sink unavailable".to_string()));
            }
        }
        self.delivered.push(event.id.clone());
        Ok(())
    }
}

#[test]
fn enqueue_then_drain_marks_dispatched_once() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    enqueue_review_created(&store, 1, Some(10), "MOVIE", Some(8.0), None, None).unwrap();
    enqueue_review_created(&store, 2, Some(10), "MOVIE", None, None, None).unwrap();
    assert_eq!(pending(&store).unwrap().len(), 2);

    let mut sink = CollectingSink::new();
    let delivered = drain(&store, &mut sink, 100).unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(sink.delivered.len(), 2);
    assert!(pending(&store).unwrap().is_empty());

    // A second drain has nothing left to deliver.
    let mut sink = CollectingSink::new();
    assert_eq!(drain(&store, &mut sink, 100).unwrap(), 0);
}

#[test]
fn failing_sink_leaves_events_queued_for_the_next_pass() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for user in 1..=3 {
        enqueue_review_created(&store, user, Some(10), "MOVIE", None, None, None).unwrap();
    }

    let mut sink = CollectingSink::failing_after(1);
    let delivered = drain(&store, &mut sink, 100).unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(pending(&store).unwrap().len(), 2);

    // At-least-once: the next pass picks up exactly the remainder.
    let mut sink = CollectingSink::new();
    let delivered = drain(&store, &mut sink, 100).unwrap();
    assert_eq!(delivered, 2);
    assert!(pending(&store).unwrap().is_empty());
}

#[test]
fn drain_respects_the_batch_limit() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for user in 1..=5 {
        enqueue_review_created(&store, user, None, "UNKNOWN", None, None, None).unwrap();
    }

    let mut sink = CollectingSink::new();
    assert_eq!(drain(&store, &mut sink, 2).unwrap(), 2);
    assert_eq!(pending(&store).unwrap().len(), 3);
}

#[test]
fn review_submission_enqueues_a_created_event() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let config = EngineConfig::default();
    catalog::add_content(&store, 10, "The Long Cut", "SERIES").unwrap();
    catalog::add_user(&store, 1, "viewer_one", "USER").unwrap();

    let ingestor = ReviewIngestor::with_defaults(&store, &config);
    ingestor
        .submit_viewer_review(
            1,
            ReviewPayload {
                content_id: Some(10),
                body: "bingeable".to_string(),
                rating: Some(8.5),
                emotions: Some(serde_json::json!({"joy": 7})),
                ..Default::default()
            },
        )
        .unwrap();

    let queued = pending(&store).unwrap();
    assert_eq!(queued.len(), 1);
    let event = &queued[0];
    assert_eq!(event.event_type, "review_created");
    assert_eq!(event.user_id, 1);
    assert_eq!(event.content_id, Some(10));
    assert_eq!(event.content_kind, "SERIES");
    assert_eq!(event.rating, Some(8.5));
    let emotions: serde_json::Value =
        serde_json::from_str(event.emotions.as_deref().unwrap()).unwrap();
    assert_eq!(emotions["joy"], 7);
}
