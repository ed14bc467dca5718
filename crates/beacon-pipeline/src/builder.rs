//! Request payload assembly.

use crate::PipelineConfig;
use beacon_core::{deep_merge, Event};
use beacon_net::StreamingConfig;
use beacon_store::StateEntry;
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use tracing::trace;

/// Session context merged into every request built from it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Configuration in effect at build time; captured into the hit.
    pub config: PipelineConfig,
    /// Identity shared-state payload, merged into the shared `xdm` section.
    pub identity_map: Option<Value>,
    /// Implementation details block built at boot.
    pub implementation_details: Option<Value>,
    /// Active location hint, if set and unexpired.
    pub location_hint: Option<String>,
    /// Unexpired client state entries to echo back.
    pub state_entries: Vec<StateEntry>,
}

/// A built wire payload plus the per-hit URL adjustments extracted from the
/// events that produced it.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub body: Value,
    pub path_override: Option<String>,
    pub datastream_id_override: Option<String>,
}

/// Assembles wire payloads for batches of events.
pub struct RequestBuilder {
    streaming: StreamingConfig,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// Creates a builder with the default streaming markers. Streaming is
    /// declared in every request so the server can flush partial results.
    pub fn new() -> Self {
        Self {
            streaming: StreamingConfig::default(),
        }
    }

    /// Builds the collect request for a batch of experience events.
    /// Returns `None` for an empty batch.
    pub fn build_collect_request(
        &self,
        events: &[Event],
        context: &RequestContext,
    ) -> Option<BuiltRequest> {
        if events.is_empty() {
            return None;
        }

        let datastream_id_override = first_event_value(events, |e| {
            e.data_object("config")
                .and_then(|c| c.get("datastreamIdOverride"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        let config_override = first_event_value(events, |e| {
            e.data_object("config")
                .and_then(|c| c.get("datastreamConfigOverride"))
                .and_then(Value::as_object)
                .filter(|o| !o.is_empty())
                .cloned()
        });
        let path_override = first_event_value(events, |e| {
            e.data_object("request")
                .and_then(|r| r.get("path"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let mut meta = Map::new();
        meta.insert(
            "streaming".to_string(),
            serde_json::to_value(&self.streaming).unwrap_or(Value::Null),
        );
        if !context.state_entries.is_empty() {
            meta.insert(
                "state".to_string(),
                json!({ "entries": context.state_entries }),
            );
        }
        if let Some(overrides) = config_override {
            meta.insert("configOverrides".to_string(), Value::Object(overrides));
        }
        if datastream_id_override.is_some() {
            // Keep the configured id auditable when an override replaces it
            meta.insert(
                "sdkConfig".to_string(),
                json!({ "datastream": { "original": context.config.datastream_id } }),
            );
        }

        let xdm = build_shared_context(context);
        let wire_events: Vec<Value> = events.iter().map(extract_event).collect();

        let mut body = Map::new();
        body.insert("meta".to_string(), Value::Object(meta));
        if !xdm.is_empty() {
            body.insert("xdm".to_string(), Value::Object(xdm));
        }
        body.insert("events".to_string(), Value::Array(wire_events));

        trace!(events = events.len(), "Built collect request");
        Some(BuiltRequest {
            body: Value::Object(body),
            path_override,
            datastream_id_override,
        })
    }

    /// Builds the consent-update request. Path overrides on the event are
    /// deliberately ignored for this request kind. Returns `None` when the
    /// event carries no consent payload.
    pub fn build_consent_request(
        &self,
        event: &Event,
        context: &RequestContext,
    ) -> Option<BuiltRequest> {
        let consents = event
            .data_object("consents")
            .filter(|c| !c.is_empty())
            .cloned()?;

        let mut body = Map::new();
        body.insert(
            "meta".to_string(),
            json!({
                "streaming": serde_json::to_value(&self.streaming).unwrap_or(Value::Null)
            }),
        );
        body.insert(
            "query".to_string(),
            json!({ "consent": { "operations": ["update"] } }),
        );
        if let Some(identity_map) = context
            .identity_map
            .as_ref()
            .and_then(|i| i.get("identityMap"))
        {
            body.insert("identityMap".to_string(), identity_map.clone());
        }
        body.insert(
            "consent".to_string(),
            json!([{
                "standard": "Consents",
                "version": "1.0",
                "value": consents,
            }]),
        );

        trace!(event_id = %event.id, "Built consent-update request");
        Some(BuiltRequest {
            body: Value::Object(body),
            path_override: None,
            datastream_id_override: None,
        })
    }
}

/// The shared `xdm` section: identity map, implementation details, and the
/// location hint, applied request-wide rather than per event.
fn build_shared_context(context: &RequestContext) -> Map<String, Value> {
    let mut xdm = Map::new();

    if let Some(Value::Object(identity)) = &context.identity_map {
        deep_merge(&mut xdm, identity);
    }
    if let Some(details) = &context.implementation_details {
        xdm.insert("implementationDetails".to_string(), details.clone());
    }
    if let Some(hint) = &context.location_hint {
        xdm.insert("locationHint".to_string(), Value::String(hint.clone()));
    }

    xdm
}

/// Extracts one event into its positional wire object.
fn extract_event(event: &Event) -> Value {
    let mut out = Map::new();

    let mut xdm = event
        .data_object("xdm")
        .cloned()
        .unwrap_or_default();

    // Stamp the event timestamp only when the caller did not supply one;
    // a caller-supplied value is kept even if it is not validly formatted.
    let has_timestamp = xdm
        .get("timestamp")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_timestamp {
        xdm.insert(
            "timestamp".to_string(),
            Value::String(
                event
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
    }
    xdm.insert("_id".to_string(), Value::String(event.id.clone()));
    out.insert("xdm".to_string(), Value::Object(xdm));

    if let Some(data) = event.data_object("data") {
        out.insert("data".to_string(), Value::Object(data.clone()));
    }
    if let Some(query) = event.data_object("query") {
        out.insert("query".to_string(), Value::Object(query.clone()));
    }

    if let Some(dataset_id) = event.data_str("datasetId") {
        let trimmed = dataset_id.trim();
        if !trimmed.is_empty() {
            out.insert(
                "meta".to_string(),
                json!({ "collect": { "datasetId": trimmed } }),
            );
        }
    }

    Value::Object(out)
}

fn first_event_value<T>(events: &[Event], get: impl Fn(&Event) -> Option<T>) -> Option<T> {
    events.iter().find_map(get)
}
