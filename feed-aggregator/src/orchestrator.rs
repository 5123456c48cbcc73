use crate::config::SourceConfig;
use crate::fetcher::Fetcher;
use crate::normalizer::Normalizer;
use crate::traits::PageSource;
use crate::types::{ContentType, Item, PageScope, PaginationState};
use futures::future::join_all;
use metrics::counter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// What one source contributed to a `fetch_all` round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub fetched: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchAllOutcome {
    pub items: Vec<Item>,
    pub per_source: HashMap<ContentType, SourceOutcome>,
}

impl FetchAllOutcome {
    pub fn failed_sources(&self) -> Vec<ContentType> {
        let mut failed: Vec<ContentType> = self
            .per_source
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(content_type, _)| content_type.clone())
            .collect();
        failed.sort();
        failed
    }

    /// True when at least one source was queried and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.per_source.is_empty() && self.per_source.values().all(SourceOutcome::is_failure)
    }

    pub fn error_summary(&self) -> String {
        let mut errors: Vec<String> = self
            .per_source
            .values()
            .filter_map(|outcome| outcome.error.clone())
            .collect();
        errors.sort();
        errors.join("; ")
    }
}

/// Fetches every active source concurrently and settles all of them; one
/// source failing never aborts the others.
pub struct FetchOrchestrator<S> {
    fetcher: Fetcher<S>,
    normalizer: Normalizer,
    error_count: AtomicU64,
}

impl<S: PageSource> FetchOrchestrator<S> {
    pub fn new(fetcher: Fetcher<S>, normalizer: Normalizer) -> Self {
        Self {
            fetcher,
            normalizer,
            error_count: AtomicU64::new(0),
        }
    }

    pub async fn fetch_all(
        &self,
        active: &[SourceConfig],
        states: &HashMap<ContentType, PaginationState>,
        scope: &PageScope,
    ) -> FetchAllOutcome {
        let fetches = active.iter().map(|source| {
            let cursor = states
                .get(&source.content_type)
                .and_then(|state| state.cursor.clone());
            async move {
                let result = self.fetcher.fetch(source, cursor.as_deref(), scope).await;
                (source.content_type.clone(), result)
            }
        });

        // Each result carries its own source, so completion order doesn't matter.
        let settled = join_all(fetches).await;

        let mut outcome = FetchAllOutcome::default();
        for (content_type, result) in settled {
            match result {
                Ok(page) => {
                    let items = self.normalizer.normalize_all(&content_type, page.items);
                    debug!("{} contributed {} items", content_type, items.len());
                    outcome.per_source.insert(
                        content_type,
                        SourceOutcome {
                            has_more: page.next_cursor.is_some(),
                            next_cursor: page.next_cursor,
                            fetched: items.len(),
                            error: None,
                        },
                    );
                    outcome.items.extend(items);
                }
                Err(e) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    counter!("feed_source_errors_total", "source" => content_type.to_string()).increment(1);
                    warn!("Source {} failed: {}", content_type, e);

                    // Last known state stands; a failure never turns has_more on.
                    let previous = states.get(&content_type);
                    outcome.per_source.insert(
                        content_type,
                        SourceOutcome {
                            next_cursor: previous.and_then(|state| state.cursor.clone()),
                            has_more: previous.is_some_and(|state| state.has_more),
                            fetched: 0,
                            error: Some(e.to_string()),
                        },
                    );
                }
            }
        }

        outcome
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn reset_error_count(&self) {
        self.error_count.store(0, Ordering::Relaxed);
    }

    pub async fn clear_cache(&self) {
        self.fetcher.clear_cache().await;
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }
}
