//! Host-bus event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event_types;

/// Stable identifier of a host-bus event.
pub type EventId = String;

/// A unit handed over by the host event bus.
///
/// The pipeline only reads events; it never mutates payloads owned by the
/// host. Response and error events dispatched back to the bus reuse the same
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier assigned by the host.
    pub id: EventId,
    /// Event type classification (e.g. `beacon`, `consent`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event source classification (e.g. `request.content`).
    pub source: String,
    /// Host-assigned timestamp.
    pub timestamp: DateTime<Utc>,
    /// Free-form payload tree.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Event {
    /// Creates a new event with a fresh id and the current timestamp.
    pub fn new(event_type: &str, source: &str, data: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }

    /// True for experience events submitted for delivery.
    pub fn is_experience_event(&self) -> bool {
        self.event_type == event_types::BEACON && self.source == event_types::REQUEST_CONTENT
    }

    /// True for consent-update requests that follow the queuing path.
    pub fn is_consent_update_request(&self) -> bool {
        self.event_type == event_types::BEACON && self.source == event_types::UPDATE_CONSENT
    }

    /// True for the identities-reset signal, admitted unconditionally.
    pub fn is_identity_reset(&self) -> bool {
        self.event_type == event_types::IDENTITY && self.source == event_types::REQUEST_RESET
    }

    /// True for consent preferences notifications.
    pub fn is_consent_preferences(&self) -> bool {
        self.event_type == event_types::CONSENT && self.source == event_types::RESPONSE_CONTENT
    }

    /// Returns a string field from the payload, if present and non-empty.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Returns a nested object field from the payload.
    pub fn data_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.data.get(key).and_then(Value::as_object)
    }
}
