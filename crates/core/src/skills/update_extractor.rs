//! # Update Extractor
//!
//! Locates the trailing `SHARED_STATE_UPDATE:` block in generated text,
//! parses its payload permissively and returns the content with the block
//! removed. Extraction never fails: an unusable payload becomes an empty
//! update plus a warning, and the marker region is stripped regardless.

use super::json_repair::parse_permissive;
use crate::state::WhiteboardMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Sentinel label introducing the update payload
pub const UPDATE_MARKER: &str = "SHARED_STATE_UPDATE:";

/// Key used when the payload is an array instead of an object
pub const LIST_PAYLOAD_KEY: &str = "data_list";

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    // Tolerates markdown emphasis around the label
    MARKER.get_or_init(|| {
        Regex::new(r"(?:\*\*|__)?SHARED_STATE_UPDATE(?:\*\*|__)?[ \t]*:(?:\*\*|__)?")
            .expect("marker pattern is valid")
    })
}

/// How the update payload was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// No marker in the text
    NoMarker,
    /// Payload was strict JSON
    Parsed,
    /// Payload needed the repair pass
    Repaired,
    /// Payload was an array, stored under [`LIST_PAYLOAD_KEY`]
    Wrapped,
    /// Payload unusable; the update is empty
    Rejected(String),
}

/// Clean content plus the parsed update mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub content: String,
    pub updates: WhiteboardMap,
    pub status: ExtractionStatus,
}

impl Extraction {
    /// Recoverable problem worth surfacing, if any
    pub fn warning(&self) -> Option<String> {
        match &self.status {
            ExtractionStatus::Wrapped => Some(format!(
                "payload was an array; stored under '{}'",
                LIST_PAYLOAD_KEY
            )),
            ExtractionStatus::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Split generated text into publishable content and whiteboard updates
pub fn extract_updates(text: &str) -> Extraction {
    let Some(marker) = marker_regex().find_iter(text).last() else {
        return Extraction {
            content: text.to_string(),
            updates: Map::new(),
            status: ExtractionStatus::NoMarker,
        };
    };

    let region_start = region_start(text, marker.start());
    let content = close_dangling_fence(text[..region_start].trim_end());
    let payload = &text[marker.end()..];

    let (updates, status) = match parse_permissive(payload) {
        Ok(parsed) => match parsed.value {
            Value::Object(map) => {
                let status = if parsed.repaired {
                    ExtractionStatus::Repaired
                } else {
                    ExtractionStatus::Parsed
                };
                (map, status)
            }
            Value::Array(items) => {
                let mut map = Map::new();
                map.insert(LIST_PAYLOAD_KEY.to_string(), Value::Array(items));
                (map, ExtractionStatus::Wrapped)
            }
            other => (
                Map::new(),
                ExtractionStatus::Rejected(format!(
                    "payload is {} rather than an object",
                    json_type(&other)
                )),
            ),
        },
        Err(e) => (Map::new(), ExtractionStatus::Rejected(format!("{:#}", e))),
    };

    Extraction {
        content,
        updates,
        status,
    }
}

/// Start of the region to strip: the marker's line when everything before
/// the marker on that line is decoration, otherwise the marker itself.
fn region_start(text: &str, marker_start: usize) -> usize {
    let line_start = text[..marker_start]
        .rfind('\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let prefix = &text[line_start..marker_start];
    if prefix
        .chars()
        .all(|c| c.is_whitespace() || "#>*-_/`".contains(c))
    {
        line_start
    } else {
        marker_start
    }
}

/// Append a closing fence when stripping left one open
fn close_dangling_fence(content: &str) -> String {
    let fences = content
        .lines()
        .filter(|line| line.trim_start().starts_with("```"))
        .count();
    if fences % 2 == 1 {
        format!("{}\n```", content)
    } else {
        content.to_string()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
