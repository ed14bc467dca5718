//! The host event-bus boundary.

use serde_json::Value;

use crate::Event;

/// The narrow interface the pipeline consumes from the host event bus.
///
/// The pipeline never holds a reference to the host itself, only to this
/// trait object. Shared-state reads are versioned by the event id they are
/// resolved against (`at_or_before`); `None` means "latest".
pub trait HostBus: Send + Sync {
    /// Reads the shared state published by `owner`, resolved at or before
    /// the given event. Returns `None` when the state is not yet set.
    fn get_state(&self, owner: &str, at_or_before: Option<&str>) -> Option<Value>;

    /// Dispatches a new event onto the bus (response and error records,
    /// internal notifications).
    fn dispatch(&self, event: Event);

    /// Publishes the pipeline's own shared state (location hint). An absent
    /// key in the published data means "no override".
    fn publish_state(&self, data: Value);
}
