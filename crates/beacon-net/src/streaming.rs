//! Streamed response body splitting.
//!
//! The server flushes partial results as independent JSON documents
//! delimited by a record separator and a line feed. Both markers must be a
//! single character for splitting to apply; anything else falls back to
//! treating the body as one document.

use serde::{Deserialize, Serialize};

/// Default record separator: a single NUL control byte.
pub const DEFAULT_RECORD_SEPARATOR: &str = "\u{0000}";

/// Default line feed marker.
pub const DEFAULT_LINE_FEED: &str = "\n";

/// Streaming markers declared in a request's metadata and applied when
/// parsing its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    pub record_separator: String,
    pub line_feed: String,
    pub enabled: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            record_separator: DEFAULT_RECORD_SEPARATOR.to_string(),
            line_feed: DEFAULT_LINE_FEED.to_string(),
            enabled: true,
        }
    }
}

impl StreamingConfig {
    /// Splitting applies only when enabled and both markers are exactly one
    /// character.
    pub fn is_splittable(&self) -> bool {
        self.enabled && single_char(&self.record_separator).is_some() && single_char(&self.line_feed).is_some()
    }
}

fn single_char(marker: &str) -> Option<char> {
    let mut chars = marker.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Splits a response body into independent JSON documents.
///
/// The body is split on the record separator; each chunk then loses a single
/// trailing line feed, if present. Empty chunks are skipped. When the config
/// is absent or not splittable the whole body is returned as one document.
pub fn split_documents<'a>(body: &'a str, config: Option<&StreamingConfig>) -> Vec<&'a str> {
    let Some(config) = config.filter(|c| c.is_splittable()) else {
        return vec![body];
    };

    // is_splittable guarantees both markers are single characters
    let separator = single_char(&config.record_separator).expect("checked single char");
    let line_feed = single_char(&config.line_feed).expect("checked single char");

    body.split(separator)
        .map(|chunk| chunk.strip_suffix(line_feed).unwrap_or(chunk))
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(documents: &[&str], config: &StreamingConfig) -> String {
        documents
            .iter()
            .map(|d| format!("{}{}{}", config.record_separator, d, config.line_feed))
            .collect()
    }

    #[test]
    fn splits_delimited_documents() {
        let config = StreamingConfig::default();
        let body = join(&[r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#], &config);

        let documents = split_documents(&body, Some(&config));
        assert_eq!(documents, vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
    }

    #[test]
    fn round_trips_k_documents() {
        let config = StreamingConfig::default();
        for k in 1..=8 {
            let originals: Vec<String> = (0..k).map(|i| format!(r#"{{"n":{i}}}"#)).collect();
            let refs: Vec<&str> = originals.iter().map(String::as_str).collect();
            let body = join(&refs, &config);
            assert_eq!(split_documents(&body, Some(&config)), refs);
        }
    }

    #[test]
    fn trims_only_one_trailing_line_feed() {
        let config = StreamingConfig::default();
        let body = "\u{0000}{\"a\":1}\n\n";
        let documents = split_documents(body, Some(&config));
        assert_eq!(documents, vec!["{\"a\":1}\n"]);
    }

    #[test]
    fn no_config_returns_whole_body() {
        let body = "{\"a\":1}\u{0000}{\"b\":2}";
        assert_eq!(split_documents(body, None), vec![body]);
    }

    #[test]
    fn multi_character_markers_disable_splitting() {
        let config = StreamingConfig {
            record_separator: "<>".to_string(),
            line_feed: "\n".to_string(),
            enabled: true,
        };
        let body = "{\"a\":1}<>{\"b\":2}";
        assert_eq!(split_documents(body, Some(&config)), vec![body]);
    }

    #[test]
    fn empty_markers_disable_splitting() {
        let config = StreamingConfig {
            record_separator: String::new(),
            line_feed: "\n".to_string(),
            enabled: true,
        };
        assert_eq!(split_documents("abc", Some(&config)), vec!["abc"]);
    }

    #[test]
    fn disabled_config_returns_whole_body() {
        let config = StreamingConfig {
            enabled: false,
            ..StreamingConfig::default()
        };
        let body = "\u{0000}{\"a\":1}\n";
        assert_eq!(split_documents(body, Some(&config)), vec![body]);
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        let config = StreamingConfig::default();
        assert!(split_documents("", Some(&config)).is_empty());
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let config = StreamingConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "recordSeparator": "\u{0000}",
                "lineFeed": "\n",
                "enabled": true
            })
        );
    }
}
