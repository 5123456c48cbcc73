use crate::cache::{CacheStats, TtlLruCache};
use crate::config::SourceConfig;
use crate::traits::PageSource;
use crate::types::{
    AggregatorError, ContentType, DateRange, FetchConfig, PageRequest, PageScope, Result,
    SortOrder, SourcePage,
};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Cache-first page fetcher with bounded retries.
pub struct Fetcher<S> {
    source: Arc<S>,
    config: FetchConfig,
    page_size: u32,
    device_id: Option<String>,
    cache: Mutex<TtlLruCache<String, SourcePage>>,
}

impl<S: PageSource> Fetcher<S> {
    pub fn new(
        source: Arc<S>,
        config: FetchConfig,
        page_size: u32,
        device_id: Option<String>,
        cache: TtlLruCache<String, SourcePage>,
    ) -> Self {
        Self {
            source,
            config,
            page_size,
            device_id,
            cache: Mutex::new(cache),
        }
    }

    /// Fetch the page after `cursor` (or the first page) for one source.
    /// `scope` must be the one the cursor was issued under.
    pub async fn fetch(
        &self,
        source: &SourceConfig,
        cursor: Option<&str>,
        scope: &PageScope,
    ) -> Result<SourcePage> {
        let key = cache_key(
            &source.content_type,
            self.page_size,
            scope.sort_order,
            &scope.date_range,
            cursor,
        );

        if let Some(page) = self.cache.lock().await.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(page);
        }

        let request = self.build_request(source, cursor, scope);
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.source.fetch_page(&request).await {
                Ok(body) => {
                    let (page, malformed) = SourcePage::from_body(body);
                    if malformed {
                        warn!("Malformed response for {}, treating as empty page", source.content_type);
                    }
                    info!(
                        "Fetched {} items from {} (attempt {}, more: {})",
                        page.items.len(),
                        source.content_type,
                        attempt,
                        page.next_cursor.is_some()
                    );
                    self.cache.lock().await.set(key, page.clone());
                    return Ok(page);
                }
                Err(e) if e.is_client_error() => {
                    warn!("{} rejected the request: {}", source.content_type, e);
                    return Err(AggregatorError::ClientRequest {
                        source_type: source.content_type.clone(),
                        status: e.status().unwrap_or_default(),
                    });
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        error!(
                            "Failed to fetch {} after {} attempts: {}",
                            source.content_type, attempt, e
                        );
                        return Err(AggregatorError::Transient {
                            source_type: source.content_type.clone(),
                            message: e.to_string(),
                        });
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.base_delay());
                    warn!(
                        "Attempt {} failed for {}, retrying in {:?}: {}",
                        attempt, source.content_type, delay, e
                    );
                    counter!("feed_fetch_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    fn build_request(
        &self,
        source: &SourceConfig,
        cursor: Option<&str>,
        scope: &PageScope,
    ) -> PageRequest {
        let mut request = PageRequest::first_page(
            source.content_type.as_str(),
            &source.path,
            self.page_size,
            scope.sort_order.is_desc(),
        );
        request.device_id = self.device_id.clone();
        request.next_token = cursor.map(str::to_string);
        if let Some((start, end)) = scope.bounds {
            request.start_date = Some(start);
            request.end_date = Some(end);
        }
        request
    }

    fn base_delay(&self) -> Duration {
        Duration::from_millis(self.config.retry_base_delay_ms)
    }

    /// delay(n) = base * 2^(n-1), no jitter.
    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let base = self.base_delay();
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: base.saturating_mul(1 << self.config.max_attempts.min(16)),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Request fingerprint: source, page size, sort order, date range, cursor.
pub fn cache_key(
    content_type: &ContentType,
    page_size: u32,
    sort_order: SortOrder,
    date_range: &DateRange,
    cursor: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        content_type,
        page_size,
        sort_order.as_str(),
        date_range.cache_key(),
        cursor.unwrap_or("first")
    )
}
