//! Admission control: consent, identity readiness, and the boot guard.

use beacon_core::{state_owners, ConsentStatus, Event, HostBus};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Decision for an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queue a hit for this event.
    Enqueue,
    /// Identity state is not resolvable yet; the host owns redelivery.
    Hold,
    /// Consent forbids collection; dropped silently.
    Drop,
}

#[derive(Debug)]
struct GateState {
    has_booted: bool,
    consent: ConsentStatus,
}

/// Decides per event whether to enqueue, hold, or drop.
///
/// The first admission check boots the gate: the consent shared state is
/// read at most once per process lifetime, defaulting to `yes` when absent
/// or unparseable. The mutex doubles as the boot guard, so concurrent
/// admission calls cannot repeat the read.
pub struct Gatekeeper {
    state: Mutex<GateState>,
    host: Arc<dyn HostBus>,
}

impl Gatekeeper {
    pub fn new(host: Arc<dyn HostBus>) -> Self {
        Self {
            state: Mutex::new(GateState {
                has_booted: false,
                consent: ConsentStatus::Pending,
            }),
            host,
        }
    }

    /// Runs the one-time boot if it has not happened yet. Returns the
    /// consent status resolved at boot, or `None` when already booted.
    pub fn boot_if_needed(&self, event: &Event) -> Option<ConsentStatus> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.has_booted {
            return None;
        }

        let consent = self
            .host
            .get_state(state_owners::CONSENT, Some(&event.id))
            .and_then(|payload| ConsentStatus::from_consent_payload(&payload))
            .unwrap_or(ConsentStatus::Yes);

        state.consent = consent;
        state.has_booted = true;
        debug!(consent = consent.as_str(), "Gate booted");
        Some(consent)
    }

    /// Admission check for one event. Identities-reset events bypass
    /// consent entirely.
    pub fn admit(&self, event: &Event) -> Admission {
        self.boot_if_needed(event);

        if event.is_identity_reset() {
            return Admission::Enqueue;
        }

        match self.consent_status() {
            ConsentStatus::No => {
                trace!(event_id = %event.id, "Dropping event, collect consent is no");
                Admission::Drop
            }
            ConsentStatus::Yes | ConsentStatus::Pending => {
                if self
                    .host
                    .get_state(state_owners::IDENTITY, Some(&event.id))
                    .is_some()
                {
                    Admission::Enqueue
                } else {
                    debug!(event_id = %event.id, "Identity state unresolved, holding event");
                    Admission::Hold
                }
            }
        }
    }

    /// Applies a consent preferences payload. Returns the new status, or
    /// `None` when the payload carries no recognized value (the previous
    /// status is kept, never reset to pending).
    pub fn update_consent(&self, payload: &Value) -> Option<ConsentStatus> {
        let status = ConsentStatus::from_consent_payload(payload)?;
        let mut state = self.state.lock().expect("lock poisoned");
        state.consent = status;
        debug!(consent = status.as_str(), "Collect consent updated");
        Some(status)
    }

    pub fn consent_status(&self) -> ConsentStatus {
        self.state.lock().expect("lock poisoned").consent
    }

    pub fn has_booted(&self) -> bool {
        self.state.lock().expect("lock poisoned").has_booted
    }
}
