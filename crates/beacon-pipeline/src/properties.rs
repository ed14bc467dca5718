//! Session properties: the location hint and its shared-state publication.

use beacon_core::HostBus;
use beacon_store::{Database, SessionProperties, StoreResult};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Shared-state key carrying the active location hint. The key is absent
/// when no hint is set, which is itself meaningful to consumers.
pub const LOCATION_HINT_KEY: &str = "locationHint";

/// In-memory view of the persisted session properties, kept consistent with
/// the store on every mutation. A shared state is republished only when the
/// effective (expiry-checked) hint value changes.
pub struct SessionPropertiesState {
    db: Arc<Database>,
    host: Arc<dyn HostBus>,
    properties: Mutex<SessionProperties>,
}

impl SessionPropertiesState {
    /// Loads the persisted properties.
    pub fn load(db: Arc<Database>, host: Arc<dyn HostBus>) -> StoreResult<Self> {
        let properties = db.session_properties()?;
        Ok(Self {
            db,
            host,
            properties: Mutex::new(properties),
        })
    }

    /// The active location hint, or `None` when unset or expired.
    pub fn location_hint(&self) -> Option<String> {
        self.properties
            .lock()
            .expect("lock poisoned")
            .active_location_hint(Utc::now())
            .map(str::to_string)
    }

    /// Sets the location hint with a time-to-live and persists it. Publishes
    /// the shared state when the effective value changed.
    pub fn set_location_hint(&self, hint: &str, ttl_seconds: i64) -> StoreResult<()> {
        let mut properties = self.properties.lock().expect("lock poisoned");

        // Compare against the expiry-checked value so re-setting an expired
        // hint republishes even though the raw value is unchanged.
        let changed = properties.active_location_hint(Utc::now()) != Some(hint);

        properties.location_hint = Some(hint.to_string());
        properties.hint_expires_at = Some(Utc::now() + Duration::seconds(ttl_seconds));
        self.db.save_session_properties(&properties)?;

        if changed {
            debug!(hint, ttl_seconds, "Location hint updated");
            self.host.publish_state(state_data(&properties));
        }
        Ok(())
    }

    /// Clears the location hint. Publishes the cleared state when a raw
    /// value was present, expired or not, so consumers see the removal.
    pub fn clear_location_hint(&self) -> StoreResult<()> {
        let mut properties = self.properties.lock().expect("lock poisoned");

        let changed = properties.location_hint.is_some();
        properties.location_hint = None;
        properties.hint_expires_at = None;
        self.db.save_session_properties(&properties)?;

        if changed {
            debug!("Location hint cleared");
            self.host.publish_state(state_data(&properties));
        }
        Ok(())
    }

    /// Publishes the current state unconditionally (used once at boot).
    pub fn publish_current(&self) {
        let properties = self.properties.lock().expect("lock poisoned");
        self.host.publish_state(state_data(&properties));
    }
}

fn state_data(properties: &SessionProperties) -> Value {
    match properties.active_location_hint(Utc::now()) {
        Some(hint) => json!({ LOCATION_HINT_KEY: hint }),
        None => json!({}),
    }
}
