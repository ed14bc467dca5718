//! Store model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durably queued hit, owned by the queue until processed.
#[derive(Debug, Clone)]
pub struct QueuedHit {
    /// FIFO position assigned by the store.
    pub id: i64,
    /// Unique identifier of the hit (distinct from any event id).
    pub uid: String,
    /// When the hit was enqueued.
    pub created_at: DateTime<Utc>,
    /// Opaque serialized hit payload.
    pub payload: Vec<u8>,
}

/// A client state entry returned by the server and echoed on future
/// requests. Only `key`, `value`, and `max_age_seconds` travel on the wire;
/// `expires_at` is computed locally at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "maxAge")]
    pub max_age_seconds: i64,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StateEntry {
    pub fn new(key: &str, value: &str, max_age_seconds: i64) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            max_age_seconds,
            expires_at: None,
        }
    }

    /// True when the entry has outlived its max age.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }
}

/// Persisted session properties. The location hint is invalid past its
/// expiry even if still stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionProperties {
    pub location_hint: Option<String>,
    pub hint_expires_at: Option<DateTime<Utc>>,
}

impl SessionProperties {
    /// Returns the location hint, or `None` when unset or expired.
    pub fn active_location_hint(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.location_hint, self.hint_expires_at) {
            (Some(hint), Some(expiry)) if now < expiry => Some(hint.as_str()),
            _ => None,
        }
    }
}
