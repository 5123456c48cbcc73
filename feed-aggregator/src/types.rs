use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
// Use the interfaces crate for the wire contract
pub use interfaces::defs::{FeedSink, PageRequest, TransportError};
pub use interfaces::empty::NullSink;

/// Largest page the upstream API will serve in one request.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Longest span a custom date range may cover.
pub const MAX_CUSTOM_RANGE_DAYS: i64 = 365;

/// Human-readable rendering used for display and free-text search,
/// e.g. "May 21, 2024 01:23:45 PM".
pub const DISPLAY_TIME_FORMAT: &str = "%b %d, %Y %I:%M:%S %p";

/// Upstream content category. The three known categories get dedicated
/// ordering rules; anything else the API grows is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    Classifications,
    Videos,
    Environment,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Classifications => "classifications",
            ContentType::Videos => "videos",
            ContentType::Environment => "environment",
            ContentType::Other(name) => name,
        }
    }

    /// The categories every default configuration queries.
    pub fn known() -> Vec<ContentType> {
        vec![
            ContentType::Classifications,
            ContentType::Videos,
            ContentType::Environment,
        ]
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "classifications" | "classification" => ContentType::Classifications,
            "videos" | "video" => ContentType::Videos,
            "environment" | "environmental" => ContentType::Environment,
            _ => ContentType::Other(name),
        }
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        ContentType::from(value.as_str())
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record from one source after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source_type: ContentType,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw_timestamp: Option<String>,
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// First candidate field holding a non-empty string.
    pub fn str_field(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.field(name).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty())
    }

    /// First candidate field holding a number (numeric strings count).
    pub fn number_field(&self, names: &[&str]) -> Option<f64> {
        names.iter().find_map(|name| match self.field(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    pub fn formatted_time(&self) -> Option<String> {
        self.timestamp
            .map(|ts| ts.format(DISPLAY_TIME_FORMAT).to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn is_desc(self) -> bool {
        matches!(self, SortOrder::Desc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(AggregatorError::Config(format!("Unknown sort order: {}", other))),
        }
    }
}

/// Which content types the feed shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentFilter {
    #[default]
    All,
    Only(ContentType),
}

impl ContentFilter {
    pub fn matches(&self, content_type: &ContentType) -> bool {
        match self {
            ContentFilter::All => true,
            ContentFilter::Only(wanted) => wanted == content_type,
        }
    }
}

impl FromStr for ContentFilter {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AggregatorError::Config("Empty content type".to_string()));
        }
        if s.eq_ignore_ascii_case("all") {
            Ok(ContentFilter::All)
        } else {
            Ok(ContentFilter::Only(ContentType::from(s)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateRange {
    #[default]
    All,
    LastHour,
    Last24Hours,
    Last7Days,
    Last30Days,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DateRange {
    pub fn is_active(&self) -> bool {
        !matches!(self, DateRange::All)
    }

    /// Inclusive bounds relative to `now`, or `None` when unbounded.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let lookback = match self {
            DateRange::All => return None,
            DateRange::Custom { start, end } => return Some((*start, *end)),
            DateRange::LastHour => Duration::hours(1),
            DateRange::Last24Hours => Duration::hours(24),
            DateRange::Last7Days => Duration::days(7),
            DateRange::Last30Days => Duration::days(30),
        };
        Some((now - lookback, now))
    }

    /// Stable name for request fingerprints; named ranges stay stable as time moves.
    pub fn cache_key(&self) -> String {
        match self {
            DateRange::All => "all".to_string(),
            DateRange::LastHour => "last_hour".to_string(),
            DateRange::Last24Hours => "last_24_hours".to_string(),
            DateRange::Last7Days => "last_7_days".to_string(),
            DateRange::Last30Days => "last_30_days".to_string(),
            DateRange::Custom { start, end } => {
                format!("custom:{}..{}", start.timestamp(), end.timestamp())
            }
        }
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if let DateRange::Custom { start, end } = self {
            if start >= end {
                return Err(AggregatorError::InvalidDateRange(
                    "Start date must be before end date".to_string(),
                ));
            }
            if *end - *start > Duration::days(MAX_CUSTOM_RANGE_DAYS) {
                return Err(AggregatorError::InvalidDateRange(format!(
                    "Date range cannot exceed {} days",
                    MAX_CUSTOM_RANGE_DAYS
                )));
            }
            if *end > now {
                return Err(AggregatorError::InvalidDateRange(
                    "End date cannot be in the future".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for DateRange {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(DateRange::All),
            "last_hour" | "1h" => Ok(DateRange::LastHour),
            "last_24_hours" | "24h" => Ok(DateRange::Last24Hours),
            "last_7_days" | "7d" => Ok(DateRange::Last7Days),
            "last_30_days" | "30d" => Ok(DateRange::Last30Days),
            _ => {
                // Custom ranges are written as "<start>..<end>" in RFC 3339.
                let (start, end) = s
                    .trim()
                    .split_once("..")
                    .ok_or_else(|| AggregatorError::Config(format!("Unknown date range: {}", s)))?;
                let parse = |v: &str| {
                    DateTime::parse_from_rfc3339(v.trim())
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| AggregatorError::Config(format!("Invalid date {}: {}", v, e)))
                };
                Ok(DateRange::Custom {
                    start: parse(start)?,
                    end: parse(end)?,
                })
            }
        }
    }
}

/// What the feed shows; replaced wholesale on every filter change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub content_type: ContentFilter,
    pub date_range: DateRange,
    pub sort_order: SortOrder,
    pub search_query: String,
}

impl FilterCriteria {
    pub fn with_content_type(mut self, content_type: ContentFilter) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    /// True when switching to `next` changes which sources are queried or what
    /// they are asked for, so already-loaded data can't be reused.
    pub fn requires_reload(&self, next: &FilterCriteria) -> bool {
        self.content_type != next.content_type || self.date_range != next.date_range
    }
}

/// Server-side parameters of one cursor chain. Fixed when the first page is
/// requested; every later page of the chain is asked for with the same ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageScope {
    pub sort_order: SortOrder,
    pub date_range: DateRange,
    pub bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl PageScope {
    pub fn resolve(criteria: &FilterCriteria, now: DateTime<Utc>) -> Self {
        Self {
            sort_order: criteria.sort_order,
            date_range: criteria.date_range.clone(),
            bounds: criteria.date_range.resolve(now),
        }
    }
}

/// Cursor bookkeeping for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    pub cursor: Option<String>,
    pub has_more: bool,
    pub loading: bool,
    pub total_loaded: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            cursor: None,
            has_more: true,
            loading: false,
            total_loaded: 0,
        }
    }
}

impl PaginationState {
    pub fn can_load_more(&self) -> bool {
        self.has_more && !self.loading
    }

    pub fn begin(&mut self) {
        self.loading = true;
    }

    pub fn complete(&mut self, next_cursor: Option<String>, loaded: usize) {
        self.has_more = next_cursor.is_some();
        self.cursor = next_cursor;
        self.total_loaded += loaded;
        self.loading = false;
    }

    /// A failed fetch keeps the last known cursor and `has_more`.
    pub fn fail(&mut self) {
        self.loading = false;
    }
}

/// One page as returned by a source, before items are normalized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourcePage {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
}

impl SourcePage {
    /// Coerce a response body into a page. Returns the page and whether the
    /// body was missing the expected shape.
    pub fn from_body(body: Value) -> (Self, bool) {
        let mut malformed = false;
        let (items, next_cursor) = match body {
            Value::Object(mut map) => {
                let items = match map.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => {
                        malformed = true;
                        Vec::new()
                    }
                };
                let next_cursor = match map.remove("next_token") {
                    Some(Value::String(token)) if !token.is_empty() => Some(token),
                    _ => None,
                };
                (items, next_cursor)
            }
            _ => {
                malformed = true;
                (Vec::new(), None)
            }
        };
        (Self { items, next_cursor }, malformed)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Feed-Aggregator/1.0".to_string(),
            timeout_seconds: 30,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_type}: request rejected with HTTP {status}")]
    ClientRequest { source_type: ContentType, status: u16 },

    #[error("{source_type}: {message}")]
    Transient { source_type: ContentType, message: String },

    #[error("All {sources} sources failed to load: {message}")]
    AllSourcesFailed { sources: usize, message: String },

    #[error("Loading more failed for {sources} sources: {message}")]
    LoadMoreFailed { sources: usize, message: String },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AggregatorError::Transient { .. } | AggregatorError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
