//! Correlates streamed response records back to their originating events.

use crate::{
    CallbackRegistry, EventError, EventHandle, ResponseDocument, SessionPropertiesState,
    HANDLE_TYPE_LOCATION_HINT, HANDLE_TYPE_STATE_STORE,
};
use beacon_core::{event_types, Event, EventId, HostBus};
use beacon_net::ResponseCallback;
use beacon_store::{Database, StateEntry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace, warn};

/// Location hint scope the pipeline consumes; other scopes are ignored.
const LOCATION_HINT_SCOPE: &str = "Network";

/// Tracks, per in-flight request, the ordered ids of the events it carries,
/// and turns each streamed record into host-bus notifications and callback
/// invocations.
///
/// Accessed concurrently from network completion callbacks; the batch map is
/// guarded by a mutex, never held across dispatch.
pub struct ResponseCorrelator {
    waiting: Mutex<HashMap<String, Vec<EventId>>>,
    host: Arc<dyn HostBus>,
    store: Arc<Database>,
    callbacks: Arc<CallbackRegistry>,
    properties: Arc<SessionPropertiesState>,
}

impl ResponseCorrelator {
    pub fn new(
        host: Arc<dyn HostBus>,
        store: Arc<Database>,
        callbacks: Arc<CallbackRegistry>,
        properties: Arc<SessionPropertiesState>,
    ) -> Self {
        Self {
            waiting: Mutex::new(HashMap::new()),
            host,
            store,
            callbacks,
            properties,
        }
    }

    /// Records the ordered event ids carried by a dispatched request. The
    /// order must match the request's events array for index resolution.
    pub fn add_waiting_batch(&self, request_id: &str, event_ids: Vec<EventId>) {
        if request_id.is_empty() || event_ids.is_empty() {
            return;
        }

        let mut waiting = self.waiting.lock().expect("lock poisoned");
        if waiting.insert(request_id.to_string(), event_ids).is_some() {
            warn!(request_id, "Waiting batch collision, events list overwritten");
        }
    }

    /// Removes and returns the batch for a request, if any.
    pub fn remove_waiting_batch(&self, request_id: &str) -> Option<Vec<EventId>> {
        self.waiting
            .lock()
            .expect("lock poisoned")
            .remove(request_id)
    }

    /// The event ids currently waiting on a request.
    pub fn waiting_events(&self, request_id: &str) -> Option<Vec<EventId>> {
        self.waiting
            .lock()
            .expect("lock poisoned")
            .get(request_id)
            .cloned()
    }

    /// Processes one streamed success document: handles, then errors, then
    /// warnings, each dispatched independently. Malformed JSON is ignored.
    pub fn on_success_document(&self, request_id: &str, json: &str) {
        let document: ResponseDocument = match serde_json::from_str(json) {
            Ok(document) => document,
            Err(e) => {
                warn!(request_id, error = %e, "Ignoring unparseable response document");
                return;
            }
        };

        trace!(
            request_id,
            handles = document.handle.len(),
            errors = document.errors.len(),
            warnings = document.warnings.len(),
            "Processing response document"
        );

        for handle in &document.handle {
            let request_event_id = self.resolve_event_id(handle.event_index, request_id);
            self.apply_handle_side_effects(handle);
            self.dispatch_handle(handle, request_id, request_event_id.as_deref());
            if let Some(id) = &request_event_id {
                self.callbacks.notify_handle(id, handle);
            }
        }

        for item in &document.errors {
            self.dispatch_error(item, request_id, true);
        }
        for item in &document.warnings {
            self.dispatch_error(item, request_id, false);
        }
    }

    /// Processes a terminal error document. A document with structured error
    /// items dispatches one notification per item; a plain object dispatches
    /// a single generic notification tagged with the correlation id only.
    pub fn on_error_document(&self, request_id: &str, json: &str) {
        let value: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                warn!(request_id, error = %e, "Ignoring unparseable error document");
                return;
            }
        };
        if !value.is_object() {
            warn!(request_id, "Ignoring non-object error document");
            return;
        }

        let structured = value
            .get("errors")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty())
            .and_then(|items| {
                serde_json::from_value::<Vec<EventError>>(Value::Array(items.clone())).ok()
            });

        match structured {
            Some(items) => {
                for item in &items {
                    self.dispatch_error(item, request_id, true);
                }
            }
            None => match serde_json::from_value::<EventError>(value) {
                Ok(item) => self.dispatch_error(&item, request_id, true),
                Err(e) => {
                    warn!(request_id, error = %e, "Failed to decode generic error document");
                }
            },
        }
    }

    /// Completes a request's response cycle: the waiting batch is removed
    /// and every carried event gets its terminal callback notification.
    pub fn on_complete(&self, request_id: &str) {
        let Some(event_ids) = self.remove_waiting_batch(request_id) else {
            return;
        };

        debug!(request_id, events = event_ids.len(), "Response cycle complete");
        for event_id in event_ids {
            self.callbacks.unregister(&event_id);
        }
    }

    /// Resolves a zero-based event index to the originating event id. A
    /// missing index defaults to 0 (single-event requests omit it). An
    /// out-of-range index or an unknown request id resolves to `None`.
    fn resolve_event_id(&self, event_index: Option<usize>, request_id: &str) -> Option<EventId> {
        let waiting = self.waiting.lock().expect("lock poisoned");
        let event_ids = waiting.get(request_id)?;
        event_ids.get(event_index.unwrap_or(0)).cloned()
    }

    /// Applies handle side effects before dispatch: state entries update the
    /// client state store, location hint results update session properties.
    fn apply_handle_side_effects(&self, handle: &EventHandle) {
        if handle.is_type(HANDLE_TYPE_STATE_STORE) {
            self.save_state_entries(handle);
        } else if handle.is_type(HANDLE_TYPE_LOCATION_HINT) {
            self.update_location_hint(handle);
        }
    }

    fn save_state_entries(&self, handle: &EventHandle) {
        let entries: Vec<StateEntry> = handle
            .payload
            .iter()
            .filter_map(|item| serde_json::from_value(Value::Object(item.clone())).ok())
            .collect();
        if entries.is_empty() {
            return;
        }

        debug!(count = entries.len(), "Saving state entries from response");
        if let Err(e) = self.store.save_state_entries(&entries) {
            error!(error = %e, "Failed to save state entries");
        }
    }

    fn update_location_hint(&self, handle: &EventHandle) {
        for item in &handle.payload {
            let scope = item.get("scope").and_then(Value::as_str);
            if scope != Some(LOCATION_HINT_SCOPE) {
                continue;
            }
            let Some(hint) = item.get("hint").and_then(Value::as_str).filter(|h| !h.is_empty())
            else {
                continue;
            };
            let ttl_seconds = item
                .get("ttlSeconds")
                .and_then(Value::as_i64)
                .unwrap_or(0);

            if let Err(e) = self.properties.set_location_hint(hint, ttl_seconds) {
                error!(error = %e, "Failed to persist location hint");
            }
        }
    }

    /// Dispatches one handle as a response event. The event source is the
    /// server-declared handle type when present.
    fn dispatch_handle(
        &self,
        handle: &EventHandle,
        request_id: &str,
        request_event_id: Option<&str>,
    ) {
        let Ok(Value::Object(mut data)) = serde_json::to_value(handle) else {
            return;
        };
        if data.is_empty() {
            return;
        }
        attach_correlation(&mut data, request_id, request_event_id);

        let source = handle
            .handle_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(event_types::RESPONSE_CONTENT);

        self.host
            .dispatch(Event::new(event_types::BEACON, source, data));
    }

    /// Dispatches one error or warning item as an error event.
    fn dispatch_error(&self, item: &EventError, request_id: &str, is_error: bool) {
        let Ok(Value::Object(mut data)) = serde_json::to_value(item) else {
            return;
        };
        if is_error {
            error!(request_id, detail = ?item.title, "Received event error");
        } else {
            warn!(request_id, detail = ?item.title, "Received event warning");
        }

        let request_event_id = self.resolve_event_id(item.event_index(), request_id);
        attach_correlation(&mut data, request_id, request_event_id.as_deref());

        self.host.dispatch(Event::new(
            event_types::BEACON,
            event_types::ERROR_RESPONSE,
            data,
        ));

        // Warnings are informational; only errors reach registered callbacks
        if is_error {
            if let Some(id) = &request_event_id {
                self.callbacks.notify_error(id, item);
            }
        }
    }
}

fn attach_correlation(
    data: &mut Map<String, Value>,
    request_id: &str,
    request_event_id: Option<&str>,
) {
    data.insert(
        "requestId".to_string(),
        Value::String(request_id.to_string()),
    );
    if let Some(id) = request_event_id {
        data.insert("requestEventId".to_string(), Value::String(id.to_string()));
    }
}

/// Adapter handing one request's network callbacks to the correlator.
pub struct CorrelatorCallback {
    request_id: String,
    correlator: Arc<ResponseCorrelator>,
}

impl CorrelatorCallback {
    pub fn new(request_id: &str, correlator: Arc<ResponseCorrelator>) -> Self {
        Self {
            request_id: request_id.to_string(),
            correlator,
        }
    }
}

impl ResponseCallback for CorrelatorCallback {
    fn on_response(&self, json: &str) {
        self.correlator.on_success_document(&self.request_id, json);
    }

    fn on_error(&self, json: &str) {
        self.correlator.on_error_document(&self.request_id, json);
    }

    fn on_complete(&self) {
        self.correlator.on_complete(&self.request_id);
    }
}
