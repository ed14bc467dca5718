//! The single-consumer hit processor.

use crate::{CorrelatorCallback, Hit, HitQueue, PipelineConfig, ResponseCorrelator};
use async_trait::async_trait;
use beacon_core::{state_owners, HostBus};
use beacon_net::{NetworkClient, ResponseCallback, SendOutcome, StreamingConfig};
use beacon_store::{Database, QueuedHit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

/// Header carrying the optional validation token from configuration.
const HEADER_VALIDATION_TOKEN: &str = "X-Validation-Token";

/// Transport seam for delivering one hit. The production implementation
/// wraps [`NetworkClient`]; tests substitute a scripted sender.
#[async_trait]
pub trait HitSender: Send + Sync {
    async fn send_hit(
        &self,
        url: Url,
        body: String,
        headers: HashMap<String, String>,
        streaming: Option<StreamingConfig>,
        callback: &dyn ResponseCallback,
    ) -> SendOutcome;
}

/// The real transport.
#[derive(Default)]
pub struct NetworkSender {
    client: NetworkClient,
}

impl NetworkSender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HitSender for NetworkSender {
    async fn send_hit(
        &self,
        url: Url,
        body: String,
        headers: HashMap<String, String>,
        streaming: Option<StreamingConfig>,
        callback: &dyn ResponseCallback,
    ) -> SendOutcome {
        self.client
            .send(url, body, &headers, streaming.as_ref(), callback)
            .await
    }
}

/// Pulls hits off the queue one at a time and applies retry policy.
///
/// Exactly one hit is in flight per processor. A retryable outcome keeps the
/// hit at the head of the queue and pauses only this processor; success and
/// terminal failure remove it and advance.
pub struct HitProcessor {
    queue: Arc<HitQueue>,
    sender: Arc<dyn HitSender>,
    correlator: Arc<ResponseCorrelator>,
    store: Arc<Database>,
    host: Arc<dyn HostBus>,
    shutdown: AtomicBool,
}

impl HitProcessor {
    pub fn new(
        queue: Arc<HitQueue>,
        sender: Arc<dyn HitSender>,
        correlator: Arc<ResponseCorrelator>,
        store: Arc<Database>,
        host: Arc<dyn HostBus>,
    ) -> Self {
        Self {
            queue,
            sender,
            correlator,
            store,
            host,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals the run loop to stop after the in-flight hit settles.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue.wake();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Runs the delivery loop until shutdown. Meant to be spawned once.
    pub async fn run(&self) {
        info!("Hit processor started");

        loop {
            if self.is_shutdown() {
                break;
            }
            if self.queue.is_suspended() {
                self.queue.wait_for_work().await;
                continue;
            }

            match self.queue.peek() {
                Ok(Some(row)) => self.process_head(row).await,
                Ok(None) => self.queue.wait_for_work().await,
                Err(e) => {
                    error!(error = %e, "Failed to read queue head");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Hit processor stopped");
    }

    /// Processes the hit at the head of the queue to a final outcome,
    /// retrying in place as long as the outcome is recoverable.
    async fn process_head(&self, row: QueuedHit) {
        let hit = match Hit::decode(&row.payload) {
            Ok(hit) => hit,
            Err(e) => {
                // Corrupted or foreign row: local decode failure is terminal
                debug!(uid = %row.uid, error = %e, "Dropping undecodable hit");
                if let Err(e) = self.queue.remove(&row.uid) {
                    error!(uid = %row.uid, error = %e, "Failed to remove hit");
                }
                return;
            }
        };

        loop {
            if self.is_shutdown() || self.queue.is_suspended() {
                // The hit stays at the head for the next resume
                return;
            }

            match self.process_hit(&hit).await {
                SendOutcome::Retry(interval) => {
                    debug!(
                        request_id = hit.request_id(),
                        interval_secs = interval.as_secs(),
                        "Hit will be retried"
                    );
                    sleep(interval).await;
                }
                outcome => {
                    debug!(request_id = hit.request_id(), ?outcome, "Hit settled");
                    if let Err(e) = self.queue.remove(&row.uid) {
                        error!(uid = %row.uid, error = %e, "Failed to remove hit");
                    }
                    return;
                }
            }
        }
    }

    async fn process_hit(&self, hit: &Hit) -> SendOutcome {
        match hit {
            Hit::IdentityReset { request_id } => {
                // Local only: wipe the client state store, nothing to send
                info!(request_id = %request_id, "Processing identities reset");
                if let Err(e) = self.store.clear_state_entries() {
                    error!(error = %e, "Failed to clear state entries on reset");
                }
                SendOutcome::Success
            }
            _ => self.send_network_hit(hit).await,
        }
    }

    async fn send_network_hit(&self, hit: &Hit) -> SendOutcome {
        let Some(kind) = hit.request_kind() else {
            return SendOutcome::Success;
        };
        let request_id = hit.request_id();

        // Response records reference events by index; the order here must
        // match the order the events were serialized into the request.
        self.correlator
            .add_waiting_batch(request_id, hit.event_ids().to_vec());

        // Hits persisted before configuration capture fall back to the
        // live configuration shared state.
        let Some(config) = hit.configuration().cloned().or_else(|| self.live_config()) else {
            warn!(request_id, "No configuration available, dropping hit");
            self.correlator.on_complete(request_id);
            return SendOutcome::Terminal;
        };

        let datastream_id = hit
            .datastream_id_override()
            .unwrap_or(&config.datastream_id);

        let url = match config.endpoint().build_url(
            kind,
            hit.path_override(),
            datastream_id,
            request_id,
        ) {
            Ok(url) => url,
            Err(e) => {
                debug!(request_id, error = %e, "Failed to build request URL, dropping hit");
                self.correlator.on_complete(request_id);
                return SendOutcome::Terminal;
            }
        };

        let body = hit
            .body()
            .map(|b| b.to_string())
            .unwrap_or_default();

        let mut headers = HashMap::new();
        if let Some(token) = &config.validation_token {
            headers.insert(HEADER_VALIDATION_TOKEN.to_string(), token.clone());
        }

        let callback = CorrelatorCallback::new(request_id, self.correlator.clone());
        self.sender
            .send_hit(url, body, headers, hit.streaming_config(), &callback)
            .await
    }

    fn live_config(&self) -> Option<PipelineConfig> {
        let state = self.host.get_state(state_owners::CONFIGURATION, None)?;
        PipelineConfig::from_shared_state(&state)
    }
}
