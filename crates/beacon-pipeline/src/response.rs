//! Server response document model.
//!
//! One streamed JSON document may carry handles (typed result payloads),
//! errors, and warnings, each optionally tied to an originating event by a
//! zero-based index into the request's event array.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handle type that updates the client state store.
pub const HANDLE_TYPE_STATE_STORE: &str = "state:store";

/// Handle type that carries location hint results.
pub const HANDLE_TYPE_LOCATION_HINT: &str = "locationHint:result";

/// A decoded success document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDocument {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub handle: Vec<EventHandle>,
    #[serde(default)]
    pub errors: Vec<EventError>,
    #[serde(default)]
    pub warnings: Vec<EventError>,
}

/// A typed result payload unit returned by the server. The event index is
/// internal correlation data and is skipped on re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandle {
    #[serde(default, skip_serializing)]
    pub event_index: Option<usize>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub handle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<Map<String, Value>>,
}

impl EventHandle {
    /// True when this handle's type matches (case-insensitive).
    pub fn is_type(&self, expected: &str) -> bool {
        self.handle_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(expected))
    }
}

/// An error or warning item attached to a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ErrorReport>,
}

impl EventError {
    /// The event index carried inside the report, if any.
    pub fn event_index(&self) -> Option<usize> {
        self.report.as_ref().and_then(|r| r.event_index)
    }
}

/// Additional error detail. The event index is skipped on re-serialization;
/// everything else passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    #[serde(default, skip_serializing)]
    pub event_index: Option<usize>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}
