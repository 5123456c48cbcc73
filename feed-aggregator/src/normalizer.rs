//! Turns raw source records into [`Item`]s: source type attached, timestamp
//! parsed from the first usable candidate field, identity derived.

use crate::config::{DEFAULT_ID_FIELDS, DEFAULT_TIMESTAMP_FIELDS};
use crate::types::{ContentType, Item};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Numeric epochs above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Clone)]
pub struct Normalizer {
    timestamp_fields: Vec<String>,
    id_fields: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_TIMESTAMP_FIELDS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_ID_FIELDS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl Normalizer {
    pub fn new(timestamp_fields: Vec<String>, id_fields: Vec<String>) -> Self {
        Self {
            timestamp_fields,
            id_fields,
        }
    }

    /// Normalize one record. Records that aren't JSON objects are dropped.
    pub fn normalize(&self, source_type: &ContentType, record: Value) -> Option<Item> {
        let fields = match record {
            Value::Object(fields) => fields,
            other => {
                debug!("Skipping non-object record from {}: {}", source_type, other);
                return None;
            }
        };

        let raw = first_present(&fields, &self.timestamp_fields);
        let raw_timestamp = raw.map(raw_string);
        let timestamp = raw.and_then(parse_timestamp);
        let source_id = first_present(&fields, &self.id_fields).map(raw_string);
        let id = item_id(source_type, source_id.as_deref(), raw_timestamp.as_deref());

        Some(Item {
            id,
            source_type: source_type.clone(),
            timestamp,
            raw_timestamp,
            fields,
        })
    }

    pub fn normalize_all(&self, source_type: &ContentType, records: Vec<Value>) -> Vec<Item> {
        records
            .into_iter()
            .filter_map(|record| self.normalize(source_type, record))
            .collect()
    }
}

/// Identity from `(source type, source id or raw timestamp, raw timestamp)`.
pub fn item_id(source_type: &ContentType, source_id: Option<&str>, raw_timestamp: Option<&str>) -> String {
    let raw_timestamp = raw_timestamp.unwrap_or("");
    let source_id = source_id.unwrap_or(raw_timestamp);
    format!("{}:{}:{}", source_type, source_id, raw_timestamp)
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Zone-less timestamps are UTC upstream.
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn first_present<'a>(fields: &'a serde_json::Map<String, Value>, candidates: &[String]) -> Option<&'a Value> {
    candidates
        .iter()
        .find_map(|name| fields.get(name).filter(|v| !v.is_null()))
}

fn raw_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
