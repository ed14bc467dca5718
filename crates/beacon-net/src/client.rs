//! Network client for collection requests.

use crate::{split_documents, StreamingConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// HTTP status codes classified as recoverable. This exact allow-list is
/// load-bearing: broadening it changes retry/drop behavior observably.
pub const RECOVERABLE_STATUS_CODES: [u16; 5] = [408, 429, 502, 503, 504];

/// Pause applied before retrying when the server does not say otherwise.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

const HEADER_VALUE_APPLICATION_JSON: &str = "application/json";
const DEFAULT_GENERIC_ERROR_TITLE: &str = "Unexpected Error";
const DEFAULT_GENERIC_ERROR_DETAIL: &str =
    "Request to the collection endpoint failed with an unknown error";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request callback invoked while a response is parsed.
///
/// `on_response` fires once per streamed JSON document, in body order.
/// `on_error` fires exactly once on a terminal failure with a single
/// JSON-formatted error document. `on_complete` fires exactly once per hit,
/// on success or terminal failure, never on retry.
pub trait ResponseCallback: Send + Sync {
    fn on_response(&self, json: &str);
    fn on_error(&self, json: &str);
    fn on_complete(&self);
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; any content was handed to the callback.
    Success,
    /// Recoverable condition; hold the hit and retry after the interval.
    Retry(Duration),
    /// Rejected; an error document was handed to the callback.
    Terminal,
}

impl SendOutcome {
    /// True when the hit is finished (success or terminal failure).
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Retry(_))
    }
}

/// HTTP client for delivering hits to the collection network.
pub struct NetworkClient {
    client: reqwest::Client,
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Sends one hit and classifies the outcome.
    ///
    /// Default `Accept`/`Content-Type` headers are always `application/json`;
    /// caller headers are added on top and cannot replace those two.
    pub async fn send(
        &self,
        url: Url,
        body: String,
        headers: &HashMap<String, String>,
        streaming: Option<&StreamingConfig>,
        callback: &dyn ResponseCallback,
    ) -> SendOutcome {
        if body.is_empty() {
            warn!(url = %url, "Request body is empty, dropping this request");
            callback.on_complete();
            return SendOutcome::Success;
        }

        let header_map = build_headers(headers);
        debug!(url = %url, bytes = body.len(), "Sending request");

        let response = match self
            .client
            .post(url.clone())
            .headers(header_map)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // No response received; the payload is presumed rejected.
                warn!(url = %url, error = %e, "Transport error, not retrying");
                callback.on_error(&compose_generic_error(Some(&e.to_string())));
                callback.on_complete();
                return SendOutcome::Terminal;
            }
        };

        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            debug!(url = %url, "Request successful, no content returned");
            callback.on_complete();
            return SendOutcome::Success;
        }

        if status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.handle_content(&body, streaming, callback);
            callback.on_complete();
            return SendOutcome::Success;
        }

        if RECOVERABLE_STATUS_CODES.contains(&status.as_u16()) {
            let interval = retry_interval(response.headers());
            debug!(url = %url, status = %status, retry_after = ?interval, "Recoverable error, will retry");
            return SendOutcome::Retry(interval);
        }

        warn!(url = %url, status = %status, "Unrecoverable error");
        let body = response.text().await.unwrap_or_default();
        callback.on_error(&compose_generic_error(Some(&body)));
        callback.on_complete();
        SendOutcome::Terminal
    }

    /// Hands each streamed document to the callback. An empty body yields
    /// exactly one `on_response` call with the empty string.
    fn handle_content(
        &self,
        body: &str,
        streaming: Option<&StreamingConfig>,
        callback: &dyn ResponseCallback,
    ) {
        let documents = split_documents(body, streaming);
        if documents.is_empty() {
            callback.on_response(body);
            return;
        }

        trace!(count = documents.len(), "Handling response documents");
        for document in documents {
            callback.on_response(document);
        }
    }
}

/// Builds the request headers: json content headers first, then caller
/// headers, skipping any attempt to override the content headers.
fn build_headers(extra: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(ACCEPT, HeaderValue::from_static(HEADER_VALUE_APPLICATION_JSON));
    map.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(HEADER_VALUE_APPLICATION_JSON),
    );

    for (name, value) in extra {
        if name.eq_ignore_ascii_case(ACCEPT.as_str())
            || name.eq_ignore_ascii_case(CONTENT_TYPE.as_str())
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid request header"),
        }
    }

    map
}

/// Reads a `Retry-After` header as whole seconds, falling back to the
/// default interval. Only integer values are supported.
fn retry_interval(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_INTERVAL)
}

/// Composes a JSON error document from a server message. A message that is
/// already a JSON object passes through unchanged; anything else is wrapped
/// in a generic title/detail record.
fn compose_generic_error(message: Option<&str>) -> String {
    if let Some(message) = message {
        if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(message).is_ok() {
            return message.to_string();
        }
    }

    let detail = message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_GENERIC_ERROR_DETAIL);

    serde_json::json!({
        "title": DEFAULT_GENERIC_ERROR_TITLE,
        "detail": detail,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retry_interval_parses_integer_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_interval(&headers), Duration::from_secs(30));
    }

    #[test]
    fn retry_interval_defaults_on_missing_or_bad_header() {
        assert_eq!(retry_interval(&HeaderMap::new()), DEFAULT_RETRY_INTERVAL);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_interval(&headers), DEFAULT_RETRY_INTERVAL);
    }

    #[test]
    fn generic_error_passes_json_objects_through() {
        let message = r#"{"title":"Bad Request","status":400}"#;
        assert_eq!(compose_generic_error(Some(message)), message);
    }

    #[test]
    fn generic_error_wraps_plain_text() {
        let error: serde_json::Value =
            serde_json::from_str(&compose_generic_error(Some("  upstream broke  "))).unwrap();
        assert_eq!(error["title"], json!(DEFAULT_GENERIC_ERROR_TITLE));
        assert_eq!(error["detail"], json!("upstream broke"));
    }

    #[test]
    fn generic_error_default_detail_for_empty_message() {
        let error: serde_json::Value =
            serde_json::from_str(&compose_generic_error(None)).unwrap();
        assert_eq!(error["detail"], json!(DEFAULT_GENERIC_ERROR_DETAIL));

        let error: serde_json::Value =
            serde_json::from_str(&compose_generic_error(Some("   "))).unwrap();
        assert_eq!(error["detail"], json!(DEFAULT_GENERIC_ERROR_DETAIL));
    }

    #[test]
    fn json_array_body_is_wrapped_not_passed_through() {
        // Only JSON objects pass through unchanged
        let error: serde_json::Value =
            serde_json::from_str(&compose_generic_error(Some("[1,2]"))).unwrap();
        assert_eq!(error["title"], json!(DEFAULT_GENERIC_ERROR_TITLE));
        assert_eq!(error["detail"], json!("[1,2]"));
    }

    #[test]
    fn content_headers_cannot_be_replaced() {
        let mut extra = HashMap::new();
        extra.insert("Content-Type".to_string(), "text/plain".to_string());
        extra.insert("accept".to_string(), "text/html".to_string());
        extra.insert("X-Request-Token".to_string(), "abc".to_string());

        let headers = build_headers(&extra);
        assert_eq!(headers.get(ACCEPT).unwrap(), HEADER_VALUE_APPLICATION_JSON);
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            HEADER_VALUE_APPLICATION_JSON
        );
        assert_eq!(headers.get("X-Request-Token").unwrap(), "abc");
    }

    #[test]
    fn recoverable_allow_list_is_exact() {
        assert_eq!(RECOVERABLE_STATUS_CODES, [408, 429, 502, 503, 504]);
        // 500 is deliberately not recoverable
        assert!(!RECOVERABLE_STATUS_CODES.contains(&500));
    }
}
