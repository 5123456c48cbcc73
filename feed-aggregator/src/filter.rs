use crate::types::{ContentType, FilterCriteria, Item};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Narrows the merged working set to what the feed displays. Every check is
/// AND-composed; the input order is preserved.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    searchable_fields: HashMap<ContentType, Vec<String>>,
}

impl Default for FilterEngine {
    fn default() -> Self {
        let mut searchable_fields = HashMap::new();
        searchable_fields.insert(
            ContentType::Classifications,
            owned(&["species", "genus", "family", "order", "device_id", "model_id"]),
        );
        searchable_fields.insert(ContentType::Videos, owned(&["device_id", "video_key"]));
        searchable_fields.insert(ContentType::Environment, owned(&["device_id", "location"]));
        Self { searchable_fields }
    }
}

impl FilterEngine {
    pub fn new(searchable_fields: HashMap<ContentType, Vec<String>>) -> Self {
        Self { searchable_fields }
    }

    pub fn with_searchable_fields(mut self, content_type: ContentType, fields: Vec<String>) -> Self {
        self.searchable_fields.insert(content_type, fields);
        self
    }

    pub fn apply(&self, items: &[Item], criteria: &FilterCriteria, now: DateTime<Utc>) -> Vec<Item> {
        let bounds = criteria.date_range.resolve(now);
        let query = criteria.search_query.trim().to_lowercase();

        items
            .iter()
            .filter(|item| criteria.content_type.matches(&item.source_type))
            .filter(|item| match (bounds, item.timestamp) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some((start, end)), Some(ts)) => ts >= start && ts <= end,
            })
            .filter(|item| query.is_empty() || self.matches_query(item, &query))
            .cloned()
            .collect()
    }

    /// `query` must already be lowercased.
    pub fn matches_query(&self, item: &Item, query: &str) -> bool {
        if let Some(fields) = self.searchable_fields.get(&item.source_type) {
            let hit = fields
                .iter()
                .filter_map(|name| item.field(name).and_then(searchable_text))
                .any(|text| text.to_lowercase().contains(query));
            if hit {
                return true;
            }
        }

        item.formatted_time()
            .is_some_and(|time| time.to_lowercase().contains(query))
    }
}

fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
}
