//! Typed pipeline configuration read from the configuration shared state.

use beacon_net::{Endpoint, Environment};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The configuration slice the pipeline needs: the datastream identifier,
/// the endpoint environment, and an optional custom domain. Captured into
/// each hit at build time so queued hits survive configuration changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub datastream_id: String,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Optional token echoed back as a request header for debug tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_token: Option<String>,
}

fn default_environment() -> Environment {
    Environment::Production
}

impl PipelineConfig {
    /// Extracts the pipeline configuration from the configuration shared
    /// state. Returns `None` when the state or the datastream id is missing;
    /// nothing can be sent without one.
    pub fn from_shared_state(state: &Value) -> Option<Self> {
        let datastream_id = state
            .get("datastreamId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())?
            .to_string();

        let environment = Environment::from_raw(state.get("environment").and_then(Value::as_str));
        let domain = state
            .get("domain")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let validation_token = state
            .get("validationToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Some(Self {
            datastream_id,
            environment,
            domain,
            validation_token,
        })
    }

    /// The endpoint family this configuration resolves to.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.environment, self.domain.clone())
    }
}
