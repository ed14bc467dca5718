//! Response records matched back to their originating events.

use super::harness::*;
use crate::{
    CallbackRegistry, EventError, EventHandle, ResponseCorrelator, ResponseHandler,
    SessionPropertiesState,
};
use beacon_core::event_types;
use beacon_store::Database;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct CorrelatorFixture {
    correlator: Arc<ResponseCorrelator>,
    host: Arc<MockHost>,
    store: Arc<Database>,
    callbacks: Arc<CallbackRegistry>,
    properties: Arc<SessionPropertiesState>,
}

fn make_fixture() -> CorrelatorFixture {
    let host = MockHost::with_default_states();
    let store = Arc::new(Database::open_in_memory().unwrap());
    let callbacks = Arc::new(CallbackRegistry::new());
    let properties =
        Arc::new(SessionPropertiesState::load(store.clone(), host.clone()).unwrap());
    let correlator = Arc::new(ResponseCorrelator::new(
        host.clone(),
        store.clone(),
        callbacks.clone(),
        properties.clone(),
    ));
    CorrelatorFixture {
        correlator,
        host,
        store,
        callbacks,
        properties,
    }
}

/// Handles with in-range indices carry the matching event ids, in order.
#[test]
fn handles_resolve_event_ids_by_index() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string(), "e1".to_string()]);

    fixture.correlator.on_success_document(
        "r1",
        &json!({
            "requestId": "r1",
            "handle": [
                {"type": "personalization", "eventIndex": 0, "payload": [{"id": "a"}]},
                {"type": "personalization", "eventIndex": 1, "payload": [{"id": "b"}]}
            ]
        })
        .to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[0].data["requestEventId"], json!("e0"));
    assert_eq!(dispatched[1].data["requestEventId"], json!("e1"));
    assert_eq!(dispatched[0].data["requestId"], json!("r1"));
    assert_eq!(dispatched[0].source, "personalization");
}

/// A missing index defaults to event zero (single-event requests omit it).
#[test]
fn missing_index_defaults_to_first_event() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    fixture.correlator.on_success_document(
        "r1",
        &json!({"handle": [{"type": "state:store", "payload": [{"key": "k", "value": "v", "maxAge": 60}]}]})
            .to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched[0].data["requestEventId"], json!("e0"));
}

/// An out-of-range index still dispatches, without a requestEventId.
#[test]
fn out_of_range_index_dispatches_without_event_id() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string(), "e1".to_string()]);

    fixture.correlator.on_success_document(
        "r1",
        &json!({"handle": [{"type": "personalization", "eventIndex": 99, "payload": [{"id": "x"}]}]})
            .to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert!(dispatched[0].data.get("requestEventId").is_none());
    assert_eq!(dispatched[0].data["requestId"], json!("r1"));
}

/// A correlation id with no waiting batch still produces a notification.
#[test]
fn unknown_request_id_still_dispatches() {
    let fixture = make_fixture();

    fixture.correlator.on_success_document(
        "stray",
        &json!({"handle": [{"type": "personalization", "payload": [{"id": "x"}]}]}).to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert!(dispatched[0].data.get("requestEventId").is_none());
}

/// state:store handles update the client state store as a side effect.
#[test]
fn state_handles_update_the_store() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    fixture.correlator.on_success_document(
        "r1",
        &json!({"handle": [{
            "type": "state:store",
            "payload": [
                {"key": "k1", "value": "v1", "maxAge": 600},
                {"key": "k2", "value": "v2", "maxAge": 0}
            ]
        }]})
        .to_string(),
    );

    let entries = fixture.store.active_state_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "k1");
}

/// locationHint:result handles for the network scope update the session
/// properties; other scopes are ignored.
#[test]
fn location_hint_handles_update_properties() {
    let fixture = make_fixture();

    fixture.correlator.on_success_document(
        "r1",
        &json!({"handle": [{
            "type": "locationHint:result",
            "payload": [
                {"scope": "Network", "hint": "or2", "ttlSeconds": 1800},
                {"scope": "Target", "hint": "t35", "ttlSeconds": 1800}
            ]
        }]})
        .to_string(),
    );

    assert_eq!(fixture.properties.location_hint().as_deref(), Some("or2"));
}

/// Error items resolve their event via report.eventIndex and reach both
/// the host bus and registered callbacks.
#[test]
fn error_items_resolve_and_notify_callbacks() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string(), "e1".to_string()]);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    struct CountingHandler(Arc<AtomicUsize>);
    impl ResponseHandler for CountingHandler {
        fn on_handle(&self, _handle: &EventHandle) {}
        fn on_error(&self, _error: &EventError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self) {}
    }
    fixture
        .callbacks
        .register("e1", Some(Arc::new(CountingHandler(counter))), None);

    fixture.correlator.on_success_document(
        "r1",
        &json!({"errors": [{
            "title": "Processing failed",
            "status": 500,
            "report": {"eventIndex": 1, "cause": "downstream"}
        }]})
        .to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].source, event_types::ERROR_RESPONSE);
    assert_eq!(dispatched[0].data["requestEventId"], json!("e1"));
    // The report's eventIndex is internal and never re-dispatched
    assert!(dispatched[0].data["report"].get("eventIndex").is_none());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

/// Warnings dispatch error notifications but do not feed callbacks.
#[test]
fn warnings_dispatch_without_callback_notification() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    let errors = Arc::new(AtomicUsize::new(0));
    struct CountingHandler(Arc<AtomicUsize>);
    impl ResponseHandler for CountingHandler {
        fn on_handle(&self, _handle: &EventHandle) {}
        fn on_error(&self, _error: &EventError) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self) {}
    }
    fixture
        .callbacks
        .register("e0", Some(Arc::new(CountingHandler(errors.clone()))), None);

    fixture.correlator.on_success_document(
        "r1",
        &json!({"warnings": [{"title": "Degraded", "report": {"eventIndex": 0}}]}).to_string(),
    );

    assert_eq!(fixture.host.dispatched().len(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

/// A top-level error document with no items dispatches one generic
/// notification tagged with the correlation id only.
#[test]
fn plain_error_document_dispatches_single_notification() {
    let fixture = make_fixture();

    fixture.correlator.on_error_document(
        "r1",
        &json!({"title": "Unexpected Error", "detail": "upstream broke"}).to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].data["requestId"], json!("r1"));
    assert_eq!(dispatched[0].data["title"], json!("Unexpected Error"));
    assert!(dispatched[0].data.get("requestEventId").is_none());
}

/// An error document with structured items dispatches one notification
/// per item.
#[test]
fn structured_error_document_dispatches_per_item() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    fixture.correlator.on_error_document(
        "r1",
        &json!({"errors": [
            {"title": "first", "report": {"eventIndex": 0}},
            {"title": "second"}
        ]})
        .to_string(),
    );

    let dispatched = fixture.host.dispatched();
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[0].data["requestEventId"], json!("e0"));
    assert!(dispatched[1].data.get("requestEventId").is_none());
}

/// Malformed inbound JSON is ignored: no notification, no crash.
#[test]
fn malformed_json_is_ignored() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    fixture.correlator.on_success_document("r1", "{ not json");
    fixture.correlator.on_error_document("r1", "also not json");
    fixture.correlator.on_error_document("r1", "[1, 2, 3]");

    assert!(fixture.host.dispatched().is_empty());
    // The waiting batch survives for valid records that may still arrive
    assert!(fixture.correlator.waiting_events("r1").is_some());
}

/// Completion removes the batch and fires each event's terminal callback
/// exactly once; retries never complete the cycle.
#[test]
fn completion_unregisters_callbacks_exactly_once() {
    let fixture = make_fixture();
    fixture
        .correlator
        .add_waiting_batch("r1", vec!["e0".to_string()]);

    let completions = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(0usize));
    let counter = completions.clone();
    let sink = received.clone();
    fixture.callbacks.register(
        "e0",
        None,
        Some(Box::new(move |handles, _errors| {
            counter.fetch_add(1, Ordering::SeqCst);
            *sink.lock().unwrap() = handles.len();
        })),
    );

    fixture.correlator.on_success_document(
        "r1",
        &json!({"handle": [{"type": "personalization", "payload": [{"id": "x"}]}]}).to_string(),
    );

    fixture.correlator.on_complete("r1");
    fixture.correlator.on_complete("r1");

    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(*received.lock().unwrap(), 1);
    assert!(fixture.correlator.waiting_events("r1").is_none());
    assert!(fixture.callbacks.is_empty());
}

/// End to end: a streamed response flows from the transport through the
/// correlator to the host bus and the registered completion callback.
#[tokio::test]
async fn end_to_end_response_correlation() {
    let test = TestPipeline::new();
    let event = simple_experience_event();

    let completed = Arc::new(Mutex::new(None::<(usize, usize)>));
    let sink = completed.clone();
    test.pipeline.register_callbacks(
        &event.id,
        None,
        Some(Box::new(move |handles, errors| {
            *sink.lock().unwrap() = Some((handles.len(), errors.len()));
        })),
    );

    test.sender.queue_response(SenderResponse::Success {
        documents: vec![json!({
            "handle": [
                {"type": "state:store", "payload": [{"key": "k", "value": "v", "maxAge": 600}]},
                {"type": "personalization", "eventIndex": 0, "payload": [{"id": "offer"}]}
            ]
        })
        .to_string()],
    });

    test.pipeline.handle_event(&event).unwrap();
    test.start();
    assert!(wait_for_drain(&test).await);
    assert!(
        wait_until(std::time::Duration::from_secs(2), || {
            completed.lock().unwrap().is_some()
        })
        .await
    );

    // Both handles dispatched with full correlation
    let dispatched = test.host.dispatched();
    assert_eq!(dispatched.len(), 2);
    for response in &dispatched {
        assert_eq!(response.event_type, event_types::BEACON);
        assert_eq!(response.data["requestEventId"], json!(event.id));
    }

    // The state entry was persisted for future request builds
    assert_eq!(test.store.active_state_entries().unwrap().len(), 1);

    // The completion callback saw both handles and no errors
    assert_eq!(*completed.lock().unwrap(), Some((2, 0)));
}
