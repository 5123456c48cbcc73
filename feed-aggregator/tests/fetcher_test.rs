mod common;

use common::{classification, init_tracing, Reply, ScriptedSource};
use feed_aggregator::fetcher::cache_key;
use chrono::{DateTime, Utc};
use feed_aggregator::{
    AggregatorError, ContentType, DateRange, FetchConfig, Fetcher, FilterCriteria, PageScope,
    SortOrder, SourceConfig, TransportError, TtlLruCache,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const BASE_DELAY_MS: u64 = 100;

fn fetcher(source: Arc<ScriptedSource>) -> Fetcher<ScriptedSource> {
    let config = FetchConfig {
        max_attempts: 3,
        retry_base_delay_ms: BASE_DELAY_MS,
        ..FetchConfig::default()
    };
    Fetcher::new(
        source,
        config,
        50,
        Some("garden-01".to_string()),
        TtlLruCache::new(16, Duration::from_secs(300)),
    )
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-21T13:23:45Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn classifications() -> SourceConfig {
    SourceConfig::new(ContentType::Classifications)
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_not_retried() {
    init_tracing();

    let source = Arc::new(ScriptedSource::new());
    source.push("classifications", Reply::status(404));
    source.push("classifications", Reply::page(Vec::new(), None));

    let result = fetcher(source.clone())
        .fetch(&classifications(), None, &PageScope::default())
        .await;

    match result {
        Err(AggregatorError::ClientRequest { source_type, status }) => {
            assert_eq!(source_type, ContentType::Classifications);
            assert_eq!(status, 404);
        }
        other => panic!("expected a client error, got {:?}", other),
    }
    assert_eq!(source.calls_for("classifications"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_retry_with_backoff() {
    init_tracing();
    info!("Testing retry backoff");

    let source = Arc::new(ScriptedSource::new());
    for _ in 0..3 {
        source.push("classifications", Reply::status(503));
    }

    let started = tokio::time::Instant::now();
    let result = fetcher(source.clone())
        .fetch(&classifications(), None, &PageScope::default())
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(AggregatorError::Transient { .. })));
    assert!(result.as_ref().is_err_and(|e| e.is_retryable()));
    assert_eq!(source.calls_for("classifications"), 3);

    // Two sleeps between three attempts: base, then twice the base.
    assert!(elapsed >= Duration::from_millis(BASE_DELAY_MS * 3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(BASE_DELAY_MS * 7), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_failure() {
    let source = Arc::new(ScriptedSource::new());
    source.push("classifications", Reply::Fail(TransportError::Timeout));
    source.push(
        "classifications",
        Reply::page(
            vec![classification("c1", "2024-05-21T10:00:00Z", "Apis mellifera", 0.9)],
            Some("next-1"),
        ),
    );

    let page = fetcher(source.clone())
        .fetch(&classifications(), None, &PageScope::default())
        .await
        .expect("second attempt succeeds");

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.next_cursor.as_deref(), Some("next-1"));
    assert_eq!(source.calls_for("classifications"), 2);
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let source = Arc::new(ScriptedSource::new());
    source.push(
        "classifications",
        Reply::page(vec![classification("c1", "2024-05-21T10:00:00Z", "Bombus", 0.8)], None),
    );
    let fetcher = fetcher(source.clone());
    let scope = PageScope::default();

    let first = fetcher.fetch(&classifications(), None, &scope).await.unwrap();
    let second = fetcher.fetch(&classifications(), None, &scope).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(source.calls_for("classifications"), 1);
    assert_eq!(fetcher.cache_stats().await.hits, 1);

    // A different cursor is a different request.
    fetcher.fetch(&classifications(), Some("tok"), &scope).await.unwrap();
    assert_eq!(source.calls_for("classifications"), 2);

    fetcher.clear_cache().await;
    fetcher.fetch(&classifications(), None, &scope).await.unwrap();
    assert_eq!(source.calls_for("classifications"), 3);
}

#[tokio::test]
async fn test_malformed_body_is_an_empty_page() {
    let source = Arc::new(ScriptedSource::new());
    source.push("classifications", Reply::Body(json!({ "items": "oops", "next_token": "x" })));
    source.push("videos", Reply::Body(json!(null)));
    let fetcher = fetcher(source.clone());
    let scope = PageScope::default();

    let page = fetcher.fetch(&classifications(), None, &scope).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor.as_deref(), Some("x"));

    let page = fetcher
        .fetch(&SourceConfig::new(ContentType::Videos), None, &scope)
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.next_cursor, None);
}

#[tokio::test]
async fn test_request_carries_paging_and_filters() {
    let source = Arc::new(ScriptedSource::new());
    let criteria = FilterCriteria::default()
        .with_sort_order(SortOrder::Asc)
        .with_date_range(DateRange::LastHour);
    let scope = PageScope::resolve(&criteria, now());

    fetcher(source.clone())
        .fetch(&classifications().with_path("/v1/classifications"), Some("tok-2"), &scope)
        .await
        .unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.content_type, "classifications");
    assert_eq!(request.path, "/v1/classifications");
    assert_eq!(request.limit, 50);
    assert!(!request.sort_desc);
    assert_eq!(request.device_id.as_deref(), Some("garden-01"));
    assert_eq!(request.next_token.as_deref(), Some("tok-2"));
    assert_eq!(request.start_date, Some(now() - chrono::Duration::hours(1)));
    assert_eq!(request.end_date, Some(now()));
}

#[tokio::test]
async fn test_pages_of_a_chain_share_bounds() {
    let source = Arc::new(ScriptedSource::new());
    source.push(
        "classifications",
        Reply::page(vec![classification("c1", "2024-05-21T13:00:00Z", "Apis", 0.9)], Some("tok-1")),
    );
    let fetcher = fetcher(source.clone());
    let scope = PageScope::resolve(
        &FilterCriteria::default().with_date_range(DateRange::Last24Hours),
        now(),
    );

    fetcher.fetch(&classifications(), None, &scope).await.unwrap();
    fetcher.fetch(&classifications(), Some("tok-1"), &scope).await.unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].start_date, requests[1].start_date);
    assert_eq!(requests[0].end_date, Some(now()));
    assert_eq!(requests[1].end_date, Some(now()));
}

#[test]
fn test_cache_key_separates_requests() {
    let all = DateRange::All;
    let first = cache_key(&ContentType::Videos, 50, SortOrder::Desc, &all, None);
    assert_eq!(first, "videos|50|desc|all|first");

    assert_ne!(first, cache_key(&ContentType::Videos, 50, SortOrder::Asc, &all, None));
    assert_ne!(first, cache_key(&ContentType::Videos, 20, SortOrder::Desc, &all, None));
    assert_ne!(first, cache_key(&ContentType::Environment, 50, SortOrder::Desc, &all, None));
    assert_ne!(
        first,
        cache_key(&ContentType::Videos, 50, SortOrder::Desc, &DateRange::Last7Days, None)
    );
    assert_ne!(first, cache_key(&ContentType::Videos, 50, SortOrder::Desc, &all, Some("t")));
}
