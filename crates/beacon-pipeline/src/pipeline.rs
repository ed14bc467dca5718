//! Top-level pipeline wiring.

use crate::{
    implementation, Admission, CallbackRegistry, CompletionCallback, Gatekeeper, Hit,
    HitProcessor, HitQueue, HitSender, NetworkSender, PipelineConfig, PipelineResult,
    RequestBuilder, RequestContext, ResponseCorrelator, ResponseHandler, SessionPropertiesState,
};
use beacon_core::{state_owners, ConsentStatus, Event, HostBus};
use beacon_store::Database;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The pipeline owns every single-instance component (gate, queue,
/// correlator, callback registry) and passes them by handle to the parts
/// that need them; there is no hidden global state.
pub struct Pipeline {
    host: Arc<dyn HostBus>,
    store: Arc<Database>,
    queue: Arc<HitQueue>,
    gatekeeper: Arc<Gatekeeper>,
    correlator: Arc<ResponseCorrelator>,
    callbacks: Arc<CallbackRegistry>,
    properties: Arc<SessionPropertiesState>,
    processor: Arc<HitProcessor>,
    builder: RequestBuilder,
    implementation_details: Mutex<Option<Value>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    /// Creates a pipeline delivering over the real network transport.
    pub fn new(host: Arc<dyn HostBus>, store: Arc<Database>) -> PipelineResult<Self> {
        Self::with_sender(host, store, Arc::new(NetworkSender::new()))
    }

    /// Creates a pipeline with an injected transport (used by tests).
    pub fn with_sender(
        host: Arc<dyn HostBus>,
        store: Arc<Database>,
        sender: Arc<dyn HitSender>,
    ) -> PipelineResult<Self> {
        let queue = Arc::new(HitQueue::new(store.clone()));
        let gatekeeper = Arc::new(Gatekeeper::new(host.clone()));
        let callbacks = Arc::new(CallbackRegistry::new());
        let properties = Arc::new(SessionPropertiesState::load(store.clone(), host.clone())?);
        let correlator = Arc::new(ResponseCorrelator::new(
            host.clone(),
            store.clone(),
            callbacks.clone(),
            properties.clone(),
        ));
        let processor = Arc::new(HitProcessor::new(
            queue.clone(),
            sender,
            correlator.clone(),
            store.clone(),
            host.clone(),
        ));

        Ok(Self {
            host,
            store,
            queue,
            gatekeeper,
            correlator,
            callbacks,
            properties,
            processor,
            builder: RequestBuilder::new(),
            implementation_details: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Spawns the delivery loop. Hits queued before a previous shutdown are
    /// redelivered from the persistent queue in their original order.
    pub fn start(&self) {
        let mut task = self.task.lock().expect("lock poisoned");
        if task.is_some() {
            warn!("Pipeline already started");
            return;
        }

        let processor = self.processor.clone();
        *task = Some(tokio::spawn(async move { processor.run().await }));
    }

    /// Stops the delivery loop after the in-flight hit settles. Queued hits
    /// stay persisted for the next start.
    pub fn shutdown(&self) {
        self.processor.shutdown();
        if let Some(task) = self.task.lock().expect("lock poisoned").take() {
            drop(task);
        }
    }

    /// Routes one host-bus event through the pipeline.
    pub fn handle_event(&self, event: &Event) -> PipelineResult<()> {
        if event.is_consent_preferences() {
            self.handle_consent_preferences(event)
        } else if event.is_identity_reset() {
            self.queue_reset(event)
        } else if event.is_experience_event() {
            self.queue_experience(event)
        } else if event.is_consent_update_request() {
            self.queue_consent_update(event)
        } else {
            trace!(event_id = %event.id, "Ignoring unrelated event");
            Ok(())
        }
    }

    /// Applies a consent preferences notification. Unrecognized values keep
    /// the previous status untouched.
    pub fn handle_consent_preferences(&self, event: &Event) -> PipelineResult<()> {
        self.boot_if_needed(event)?;

        let payload = Value::Object(event.data.clone());
        if let Some(status) = self.gatekeeper.update_consent(&payload) {
            self.apply_consent(status)?;
        }
        Ok(())
    }

    /// Registers response callbacks for a request event id (the id of the
    /// event a `send`-style call produced, not the queue's correlation id).
    pub fn register_callbacks(
        &self,
        request_event_id: &str,
        handler: Option<Arc<dyn ResponseHandler>>,
        completion: Option<CompletionCallback>,
    ) {
        self.callbacks.register(request_event_id, handler, completion);
    }

    /// The active location hint, if set and unexpired.
    pub fn location_hint(&self) -> Option<String> {
        self.properties.location_hint()
    }

    /// Sets the location hint; a changed effective value republishes the
    /// pipeline's shared state.
    pub fn set_location_hint(&self, hint: &str, ttl_seconds: i64) -> PipelineResult<()> {
        Ok(self.properties.set_location_hint(hint, ttl_seconds)?)
    }

    /// Clears the location hint.
    pub fn clear_location_hint(&self) -> PipelineResult<()> {
        Ok(self.properties.clear_location_hint()?)
    }

    /// Current collect consent status.
    pub fn consent_status(&self) -> ConsentStatus {
        self.gatekeeper.consent_status()
    }

    /// Number of hits waiting in the durable queue.
    pub fn queue_len(&self) -> PipelineResult<usize> {
        self.queue.len()
    }

    /// The callback registry handle (exposed for the public API surface).
    pub fn callbacks(&self) -> Arc<CallbackRegistry> {
        self.callbacks.clone()
    }

    fn queue_experience(&self, event: &Event) -> PipelineResult<()> {
        self.boot_if_needed(event)?;

        match self.gatekeeper.admit(event) {
            Admission::Drop | Admission::Hold => return Ok(()),
            Admission::Enqueue => {}
        }

        let Some(config) = self.config_for(event) else {
            debug!(event_id = %event.id, "Configuration unavailable, unable to process event");
            return Ok(());
        };

        let context = self.request_context(event, config.clone())?;
        let Some(built) = self
            .builder
            .build_collect_request(std::slice::from_ref(event), &context)
        else {
            return Ok(());
        };

        let hit = Hit::Experience {
            request_id: Hit::new_request_id(),
            event_ids: vec![event.id.clone()],
            body: built.body,
            path_override: built.path_override,
            datastream_id_override: built.datastream_id_override,
            configuration: Some(config),
        };

        trace!(event_id = %event.id, request_id = hit.request_id(), "Queuing experience event");
        self.queue.enqueue(&hit)
    }

    fn queue_consent_update(&self, event: &Event) -> PipelineResult<()> {
        self.boot_if_needed(event)?;

        match self.gatekeeper.admit(event) {
            Admission::Drop | Admission::Hold => return Ok(()),
            Admission::Enqueue => {}
        }

        let Some(config) = self.config_for(event) else {
            debug!(event_id = %event.id, "Configuration unavailable, unable to process event");
            return Ok(());
        };

        let context = self.request_context(event, config.clone())?;
        let Some(built) = self.builder.build_consent_request(event, &context) else {
            debug!(event_id = %event.id, "Consent event carries no consent payload, ignoring");
            return Ok(());
        };

        let hit = Hit::ConsentUpdate {
            request_id: Hit::new_request_id(),
            event_ids: vec![event.id.clone()],
            body: built.body,
            configuration: Some(config),
        };

        trace!(event_id = %event.id, request_id = hit.request_id(), "Queuing consent update");
        self.queue.enqueue(&hit)
    }

    fn queue_reset(&self, event: &Event) -> PipelineResult<()> {
        self.boot_if_needed(event)?;

        // Admitted unconditionally; consent does not gate resets
        let hit = Hit::IdentityReset {
            request_id: Hit::new_request_id(),
        };
        trace!(event_id = %event.id, request_id = hit.request_id(), "Queuing identities reset");
        self.queue.enqueue(&hit)
    }

    /// One-time boot: resolves the initial consent, captures implementation
    /// details from the hub state, and publishes the initial shared state.
    fn boot_if_needed(&self, event: &Event) -> PipelineResult<()> {
        let Some(status) = self.gatekeeper.boot_if_needed(event) else {
            return Ok(());
        };

        let hub_state = self.host.get_state(state_owners::HUB, Some(&event.id));
        *self.implementation_details.lock().expect("lock poisoned") =
            implementation::implementation_details(hub_state.as_ref());

        self.properties.publish_current();
        self.apply_consent(status)
    }

    fn apply_consent(&self, status: ConsentStatus) -> PipelineResult<()> {
        if status == ConsentStatus::No {
            // Full revocation also wipes the client-side state entries
            self.store.clear_state_entries()?;
        }
        self.queue.handle_consent_change(status)
    }

    fn config_for(&self, event: &Event) -> Option<PipelineConfig> {
        let state = self
            .host
            .get_state(state_owners::CONFIGURATION, Some(&event.id))?;
        PipelineConfig::from_shared_state(&state)
    }

    fn request_context(&self, event: &Event, config: PipelineConfig) -> PipelineResult<RequestContext> {
        Ok(RequestContext {
            config,
            identity_map: self.host.get_state(state_owners::IDENTITY, Some(&event.id)),
            implementation_details: self
                .implementation_details
                .lock()
                .expect("lock poisoned")
                .clone(),
            location_hint: self.properties.location_hint(),
            state_entries: self.store.active_state_entries()?,
        })
    }
}
