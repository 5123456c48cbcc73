use crate::types::{AggregatorError, ContentType, FetchConfig, Result, MAX_PAGE_SIZE};
use std::time::Duration;
use url::Url;

pub const ENV_BASE_URL: &str = "API_BASE_URL";
pub const ENV_API_KEY: &str = "SENSING_GARDEN_API_KEY";
pub const ENV_DEVICE_ID: &str = "FEED_DEVICE_ID";
pub const ENV_PAGE_SIZE: &str = "FEED_PAGE_SIZE";
pub const ENV_CACHE_MAX_SIZE: &str = "FEED_CACHE_MAX_SIZE";
pub const ENV_CACHE_TTL_SECS: &str = "FEED_CACHE_TTL_SECS";

/// Candidate timestamp fields, checked in order; the first present, non-null one wins.
pub const DEFAULT_TIMESTAMP_FIELDS: &[&str] = &["timestamp", "created_at", "recorded_at", "start_time", "time"];

/// Candidate fields carrying a source-assigned identifier.
pub const DEFAULT_ID_FIELDS: &[&str] = &["id", "item_id", "video_key", "key"];

/// A source the engine queries, and where it lives under the API base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub content_type: ContentType,
    pub path: String,
}

impl SourceConfig {
    pub fn new(content_type: ContentType) -> Self {
        let path = content_type.as_str().to_string();
        Self { content_type, path }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub device_id: Option<String>,
    pub page_size: u32,
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub fetch: FetchConfig,
    pub sources: Vec<SourceConfig>,
    /// Tie-break ranking for equal timestamps across types, highest first.
    pub source_priority: Vec<ContentType>,
    pub timestamp_fields: Vec<String>,
    pub id_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            api_key: None,
            device_id: None,
            page_size: 50,
            cache_max_size: 100,
            cache_ttl: Duration::from_secs(5 * 60),
            fetch: FetchConfig::default(),
            sources: ContentType::known().into_iter().map(SourceConfig::new).collect(),
            source_priority: vec![
                ContentType::Classifications,
                ContentType::Environment,
                ContentType::Videos,
            ],
            timestamp_fields: DEFAULT_TIMESTAMP_FIELDS.iter().map(|s| s.to_string()).collect(),
            id_fields: DEFAULT_ID_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(base_url) = get(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        config.api_key = get(ENV_API_KEY);
        config.device_id = get(ENV_DEVICE_ID);
        if let Some(page_size) = get(ENV_PAGE_SIZE) {
            config.page_size = parse_number(ENV_PAGE_SIZE, &page_size)?;
        }
        if let Some(max_size) = get(ENV_CACHE_MAX_SIZE) {
            config.cache_max_size = parse_number(ENV_CACHE_MAX_SIZE, &max_size)?;
        }
        if let Some(ttl) = get(ENV_CACHE_TTL_SECS) {
            config.cache_ttl = Duration::from_secs(parse_number(ENV_CACHE_TTL_SECS, &ttl)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint_base()?;
        if self.sources.is_empty() {
            return Err(AggregatorError::Config("At least one source is required".to_string()));
        }
        if self.timestamp_fields.is_empty() {
            return Err(AggregatorError::Config("At least one timestamp field is required".to_string()));
        }
        Ok(())
    }

    /// Base URL with a trailing slash, so source paths join beneath it.
    pub fn endpoint_base(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| AggregatorError::Config(format!("{} must be a number, got {:?}", key, value)))
}
