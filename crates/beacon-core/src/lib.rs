//! Core types shared across the Beacon delivery pipeline.
//!
//! This crate defines:
//! - Event: the unit of work handed over by the host event bus
//! - ConsentStatus: collect-consent state parsed from host notifications
//! - HostBus: the narrow interface the pipeline consumes from the host
//! - Deep-merge helpers over `serde_json::Value` payload trees

mod consent;
mod event;
mod host;
mod value;

pub use consent::ConsentStatus;
pub use event::{Event, EventId};
pub use host::HostBus;
pub use value::{deep_merge, flatten};

/// Shared-state owners read from the host bus.
pub mod state_owners {
    /// Active configuration: datastream id, environment, optional domain.
    pub const CONFIGURATION: &str = "configuration";
    /// Identity map for the current user/device.
    pub const IDENTITY: &str = "identity";
    /// Collect consent preferences.
    pub const CONSENT: &str = "consent";
    /// Hub metadata: library version, wrapper type.
    pub const HUB: &str = "hub";
}

/// Event type/source values used on the host bus.
pub mod event_types {
    /// Type of every event originated by or addressed to the pipeline.
    pub const BEACON: &str = "beacon";
    /// Source of an experience event submitted for delivery.
    pub const REQUEST_CONTENT: &str = "request.content";
    /// Source of a consent-update request routed through the queue.
    pub const UPDATE_CONSENT: &str = "update.consent";
    /// Type/source pair of the identities-reset signal.
    pub const IDENTITY: &str = "identity";
    pub const REQUEST_RESET: &str = "request.reset";
    /// Type/source pair of a consent preferences notification.
    pub const CONSENT: &str = "consent";
    pub const RESPONSE_CONTENT: &str = "response.content";
    /// Source used when dispatching a server error record.
    pub const ERROR_RESPONSE: &str = "error";
}
