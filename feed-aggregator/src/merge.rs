use crate::types::{ContentType, Item, SortOrder};
use std::cmp::Ordering;
use std::collections::HashSet;

const CONFIDENCE_FIELDS: &[&str] = &["species_confidence", "confidence", "score"];
const LABEL_FIELDS: &[&str] = &["species", "label", "genus", "family"];
const READING_FIELDS: &[&str] = &["value", "reading", "temperature", "ambient_temperature", "pm2p5"];
const DURATION_FIELDS: &[&str] = &["duration", "duration_seconds"];

/// Ranking used to break exact timestamp ties between different source types.
/// Types not listed rank after every listed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    order: Vec<ContentType>,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::new(vec![
            ContentType::Classifications,
            ContentType::Environment,
            ContentType::Videos,
        ])
    }
}

impl SourcePriority {
    pub fn new(order: Vec<ContentType>) -> Self {
        Self { order }
    }

    pub fn rank(&self, content_type: &ContentType) -> usize {
        self.order
            .iter()
            .position(|t| t == content_type)
            .unwrap_or(self.order.len())
    }
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    sort_order: SortOrder,
    priority: SourcePriority,
}

impl MergeEngine {
    pub fn new(sort_order: SortOrder, priority: SourcePriority) -> Self {
        Self {
            sort_order,
            priority,
        }
    }

    /// Combine `existing` and `new`, keeping the first occurrence of each id
    /// (existing before new), then sort.
    pub fn merge_and_sort(&self, existing: Vec<Item>, new: Vec<Item>) -> Vec<Item> {
        let mut seen = HashSet::with_capacity(existing.len() + new.len());
        let mut merged: Vec<Item> = existing
            .into_iter()
            .chain(new)
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        merged.sort_by(|a, b| self.compare(a, b));
        merged
    }

    /// Total order over items. Only items with equal ids compare equal.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        // Option orders None first, so a missing timestamp is the earliest one.
        let by_time = a.timestamp.cmp(&b.timestamp);
        let by_time = if self.sort_order.is_desc() {
            by_time.reverse()
        } else {
            by_time
        };

        by_time
            .then_with(|| {
                self.priority
                    .rank(&a.source_type)
                    .cmp(&self.priority.rank(&b.source_type))
            })
            .then_with(|| a.source_type.cmp(&b.source_type))
            .then_with(|| compare_within_type(a, b))
            .then_with(|| a.id.cmp(&b.id))
    }
}

fn compare_within_type(a: &Item, b: &Item) -> Ordering {
    if a.source_type != b.source_type {
        return Ordering::Equal;
    }
    match a.source_type {
        ContentType::Classifications => higher_first(
            a.number_field(CONFIDENCE_FIELDS),
            b.number_field(CONFIDENCE_FIELDS),
        )
        .then_with(|| {
            let label_a = a.str_field(LABEL_FIELDS).map(str::to_lowercase);
            let label_b = b.str_field(LABEL_FIELDS).map(str::to_lowercase);
            label_a.cmp(&label_b)
        }),
        ContentType::Environment => higher_first(
            a.number_field(READING_FIELDS),
            b.number_field(READING_FIELDS),
        ),
        ContentType::Videos => higher_first(
            a.number_field(DURATION_FIELDS),
            b.number_field(DURATION_FIELDS),
        ),
        ContentType::Other(_) => Ordering::Equal,
    }
}

/// Larger values first; a missing value sorts after any present one.
fn higher_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
