//! Implementation details reported with every request.

use serde_json::{json, Value};

/// Version of this library, combined with the host library version.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

const BASE_NAMESPACE: &str = "https://ns.beacon.dev/implementation/rust";
const UNKNOWN: &str = "unknown";
const ENVIRONMENT_APP: &str = "app";

/// Builds the implementation-details block from the hub shared state.
///
/// The hub state supplies the host library version and an optional wrapper
/// descriptor (`{"wrapper": {"type": "R"}}`). A wrapper entry without a
/// parseable type reports `unknown`; an unsupported type reports none.
/// Returns `None` when the hub state is absent or empty.
pub fn implementation_details(hub_state: Option<&Value>) -> Option<Value> {
    let hub_state = hub_state?.as_object().filter(|m| !m.is_empty())?;

    let host_version = hub_state
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN);

    let wrapper_name = match hub_state.get("wrapper") {
        None => "",
        Some(wrapper) => match wrapper.get("type").and_then(Value::as_str) {
            Some("R") => "/reactnative",
            Some(_) => "",
            None => "/unknown",
        },
    };

    Some(json!({
        "name": format!("{BASE_NAMESPACE}{wrapper_name}"),
        "version": format!("{host_version}+{LIBRARY_VERSION}"),
        "environment": ENVIRONMENT_APP,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_details_without_wrapper() {
        let hub = json!({"version": "3.1.0"});
        let details = implementation_details(Some(&hub)).unwrap();

        assert_eq!(details["name"], BASE_NAMESPACE);
        assert_eq!(details["version"], format!("3.1.0+{LIBRARY_VERSION}"));
        assert_eq!(details["environment"], "app");
    }

    #[test]
    fn react_native_wrapper_is_reflected_in_name() {
        let hub = json!({"version": "3.1.0", "wrapper": {"type": "R"}});
        let details = implementation_details(Some(&hub)).unwrap();
        assert_eq!(details["name"], format!("{BASE_NAMESPACE}/reactnative"));
    }

    #[test]
    fn wrapper_without_type_reports_unknown() {
        let hub = json!({"version": "3.1.0", "wrapper": {}});
        let details = implementation_details(Some(&hub)).unwrap();
        assert_eq!(details["name"], format!("{BASE_NAMESPACE}/unknown"));
    }

    #[test]
    fn unsupported_wrapper_type_reports_none() {
        let hub = json!({"version": "3.1.0", "wrapper": {"type": "F"}});
        let details = implementation_details(Some(&hub)).unwrap();
        assert_eq!(details["name"], BASE_NAMESPACE);
    }

    #[test]
    fn missing_version_reports_unknown() {
        let hub = json!({"extensions": {}});
        let details = implementation_details(Some(&hub)).unwrap();
        assert_eq!(details["version"], format!("unknown+{LIBRARY_VERSION}"));
    }

    #[test]
    fn absent_or_empty_hub_state_yields_none() {
        assert!(implementation_details(None).is_none());
        assert!(implementation_details(Some(&json!({}))).is_none());
    }
}
