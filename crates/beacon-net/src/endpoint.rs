//! Collection endpoint URL construction.

use crate::{NetError, NetResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default domain for the collection network.
pub const DEFAULT_DOMAIN: &str = "telemetry.beacon.dev";

/// Fixed integration endpoint; custom domains are not supported there.
const INTEGRATION_URL: &str = "https://telemetry-int.beacon.dev/ee/v1";

const PRODUCTION_PATH: &str = "/ee/v1";
const PRE_PRODUCTION_PATH: &str = "/ee-pre-prd/v1";

/// Known collection network environment families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Production,
    PreProduction,
    Integration,
}

impl Environment {
    /// Parses a configuration value, defaulting to production when the
    /// value is missing or unrecognized.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("pre-prod") => Self::PreProduction,
            Some("int") => Self::Integration,
            _ => Self::Production,
        }
    }
}

/// The request kind selects the path suffix under the versioned endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Batched experience-event submission.
    Collect,
    /// Consent update submission.
    ConsentUpdate,
}

impl RequestKind {
    fn path_suffix(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::ConsentUpdate => "privacy/set-consent",
        }
    }
}

/// An endpoint family resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    environment: Environment,
    domain: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint for the given environment. Empty custom domains
    /// are treated as absent.
    pub fn new(environment: Environment, domain: Option<String>) -> Self {
        Self {
            environment,
            domain: domain.filter(|d| !d.is_empty()),
        }
    }

    fn base_url(&self) -> String {
        let domain = self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
        match self.environment {
            Environment::Production => format!("https://{domain}{PRODUCTION_PATH}"),
            Environment::PreProduction => format!("https://{domain}{PRE_PRODUCTION_PATH}"),
            // Integration does not support custom domains
            Environment::Integration => INTEGRATION_URL.to_string(),
        }
    }

    /// Builds the full request URL.
    ///
    /// A `path_override` rewrites the URL path only; query parameters are
    /// always the configured datastream id and the request correlation id.
    pub fn build_url(
        &self,
        kind: RequestKind,
        path_override: Option<&str>,
        datastream_id: &str,
        request_id: &str,
    ) -> NetResult<Url> {
        let mut url = match path_override {
            Some(path) => {
                if !path.starts_with('/') || path.contains('?') || path.contains('#') {
                    return Err(NetError::InvalidRequest(format!(
                        "invalid path override '{path}'"
                    )));
                }
                let domain = self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
                Url::parse(&format!("https://{domain}{path}"))?
            }
            None => Url::parse(&format!("{}/{}", self.base_url(), kind.path_suffix()))?,
        };

        url.query_pairs_mut()
            .append_pair("configId", datastream_id)
            .append_pair("requestId", request_id);

        Ok(url)
    }
}
