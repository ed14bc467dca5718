//! Collect-consent status parsing.

use crate::flatten;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collect consent status, as carried on the wire (`y`/`n`/`p`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Yes,
    No,
    Pending,
}

impl ConsentStatus {
    /// Parses a raw wire value. Unrecognized values yield `None` so callers
    /// keep the status they already have instead of resetting it.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "y" => Some(Self::Yes),
            "n" => Some(Self::No),
            "p" => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "y",
            Self::No => "n",
            Self::Pending => "p",
        }
    }

    /// Extracts the collect consent value from a consent payload of the form
    /// `{"consents": {"collect": {"val": "y"}}}`. Returns `None` when the
    /// value is missing or unrecognized.
    pub fn from_consent_payload(payload: &Value) -> Option<Self> {
        let tree = payload.as_object()?;
        flatten(tree)
            .get("consents.collect.val")
            .and_then(Value::as_str)
            .and_then(Self::from_raw)
    }
}
