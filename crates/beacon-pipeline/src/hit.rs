//! The durable unit of work derived from host events.

use crate::PipelineConfig;
use beacon_core::EventId;
use beacon_net::{RequestKind, StreamingConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A hit is immutable once enqueued and owned by the queue until processed.
/// The serialized request body and the configuration in effect at build time
/// are captured inside, so queued hits survive restarts and config changes.
///
/// Older persisted hits may lack the embedded `configuration`; decoding
/// still succeeds and the processor falls back to the live configuration
/// shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Hit {
    /// A batch of experience events for the collect endpoint.
    #[serde(rename_all = "camelCase")]
    Experience {
        request_id: String,
        event_ids: Vec<EventId>,
        body: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path_override: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datastream_id_override: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        configuration: Option<PipelineConfig>,
    },

    /// A consent update for the set-consent endpoint. Path overrides are
    /// never honored for this kind.
    #[serde(rename_all = "camelCase")]
    ConsentUpdate {
        request_id: String,
        event_ids: Vec<EventId>,
        body: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        configuration: Option<PipelineConfig>,
    },

    /// An identities reset. Processed locally, no network call.
    #[serde(rename_all = "camelCase")]
    IdentityReset { request_id: String },
}

impl Hit {
    /// Assigns a fresh request correlation id, distinct from any event id.
    pub fn new_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// The request correlation id, also used as the queue row uid.
    pub fn request_id(&self) -> &str {
        match self {
            Self::Experience { request_id, .. }
            | Self::ConsentUpdate { request_id, .. }
            | Self::IdentityReset { request_id } => request_id,
        }
    }

    /// Ordered ids of the originating events carried by this hit.
    pub fn event_ids(&self) -> &[EventId] {
        match self {
            Self::Experience { event_ids, .. } | Self::ConsentUpdate { event_ids, .. } => event_ids,
            Self::IdentityReset { .. } => &[],
        }
    }

    /// The network request kind, or `None` for local-only hits.
    pub fn request_kind(&self) -> Option<RequestKind> {
        match self {
            Self::Experience { .. } => Some(RequestKind::Collect),
            Self::ConsentUpdate { .. } => Some(RequestKind::ConsentUpdate),
            Self::IdentityReset { .. } => None,
        }
    }

    /// The configuration captured at build time, if any.
    pub fn configuration(&self) -> Option<&PipelineConfig> {
        match self {
            Self::Experience { configuration, .. } | Self::ConsentUpdate { configuration, .. } => {
                configuration.as_ref()
            }
            Self::IdentityReset { .. } => None,
        }
    }

    /// Per-hit datastream id override, replacing the configured id.
    pub fn datastream_id_override(&self) -> Option<&str> {
        match self {
            Self::Experience {
                datastream_id_override,
                ..
            } => datastream_id_override.as_deref(),
            _ => None,
        }
    }

    /// Per-hit path override. Never present on consent-update hits.
    pub fn path_override(&self) -> Option<&str> {
        match self {
            Self::Experience { path_override, .. } => path_override.as_deref(),
            _ => None,
        }
    }

    /// The request body, if this hit makes a network call.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Experience { body, .. } | Self::ConsentUpdate { body, .. } => Some(body),
            Self::IdentityReset { .. } => None,
        }
    }

    /// The streaming markers declared in the request body's metadata.
    pub fn streaming_config(&self) -> Option<StreamingConfig> {
        let streaming = self.body()?.get("meta")?.get("streaming")?;
        serde_json::from_value(streaming.clone()).ok()
    }

    /// Serializes the hit for queue persistence.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decodes a persisted hit.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
