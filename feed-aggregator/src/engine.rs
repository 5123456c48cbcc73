//! The feed engine: owns the per-source cursors, the merged working set and
//! the displayed slice, and drives the load / load-more / filter / refresh
//! cycles.
//!
//! All mutable state sits behind one lock that is released before any fetch
//! is awaited. Each load captures an epoch when it starts; a commit whose
//! epoch has been superseded by a later reload is dropped.

use crate::cache::{CacheStats, TtlLruCache};
use crate::config::{EngineConfig, SourceConfig};
use crate::fetcher::Fetcher;
use crate::filter::FilterEngine;
use crate::merge::{MergeEngine, SourcePriority};
use crate::normalizer::Normalizer;
use crate::orchestrator::{FetchAllOutcome, FetchOrchestrator};
use crate::pagination::PaginationController;
use crate::sources::HttpPageSource;
use crate::traits::PageSource;
use crate::types::{
    AggregatorError, ContentType, FeedSink, FilterCriteria, Item, NullSink, PageScope, Result,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of a successful fetch round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Items that were not already in the working set.
    pub new_items: usize,
    pub has_more: bool,
    pub failed_sources: Vec<ContentType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(LoadReport),
    /// Criteria changed without touching the network.
    Refiltered,
    /// Nothing left to fetch, or the last round added nothing.
    Exhausted,
    /// Another load was already in flight.
    Busy,
    /// A newer reload started while this one was fetching; its results were dropped.
    Superseded,
}

/// Read-only snapshot of what the feed shows.
#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub displayed_items: Vec<Item>,
    pub has_more_content: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub error_count: u64,
}

struct FeedState {
    criteria: FilterCriteria,
    pagination: PaginationController,
    working_set: Vec<Item>,
    displayed: Vec<Item>,
    is_loading: bool,
    epoch: u64,
    last_error: Option<String>,
    sink: Box<dyn FeedSink<Item>>,
}

pub struct FeedEngine<S> {
    orchestrator: FetchOrchestrator<S>,
    sources: Vec<SourceConfig>,
    priority: SourcePriority,
    filter: FilterEngine,
    state: Mutex<FeedState>,
}

impl FeedEngine<HttpPageSource> {
    /// Engine backed by the HTTP API described in `config`.
    pub fn connect(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let source = Arc::new(HttpPageSource::new(&config)?);
        info!("Feed engine using {}", source.source_name());
        Ok(Self::new(source, &config))
    }
}

impl<S: PageSource> FeedEngine<S> {
    pub fn new(source: Arc<S>, config: &EngineConfig) -> Self {
        let cache = TtlLruCache::new(config.cache_max_size, config.cache_ttl);
        let fetcher = Fetcher::new(
            source,
            config.fetch.clone(),
            config.effective_page_size(),
            config.device_id.clone(),
            cache,
        );
        let normalizer = Normalizer::new(config.timestamp_fields.clone(), config.id_fields.clone());
        let pagination =
            PaginationController::new(config.sources.iter().map(|s| s.content_type.clone()));

        Self {
            orchestrator: FetchOrchestrator::new(fetcher, normalizer),
            sources: config.sources.clone(),
            priority: SourcePriority::new(config.source_priority.clone()),
            filter: FilterEngine::default(),
            state: Mutex::new(FeedState {
                criteria: FilterCriteria::default(),
                pagination,
                working_set: Vec::new(),
                displayed: Vec::new(),
                is_loading: false,
                epoch: 0,
                last_error: None,
                sink: Box::new(NullSink),
            }),
        }
    }

    pub fn with_sink(mut self, sink: impl FeedSink<Item> + 'static) -> Self {
        self.state.get_mut().sink = Box::new(sink);
        self
    }

    pub fn with_filter_engine(mut self, filter: FilterEngine) -> Self {
        self.filter = filter;
        self
    }

    pub async fn initialize(&self) -> Result<LoadOutcome> {
        self.initial_load().await
    }

    /// Reset every source and load the first page of each active one. The
    /// sort order and date bounds used here stay fixed for the cursors this
    /// load hands out, until the next reset.
    pub async fn initial_load(&self) -> Result<LoadOutcome> {
        let (epoch, active, states, scope) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.epoch += 1;
            state.is_loading = true;
            let scope = PageScope::resolve(&state.criteria, Utc::now());
            state.pagination.reset_all(scope.clone());
            let active = self.active_sources(&state.criteria);
            state.pagination.mark_loading(&content_types(&active));
            (state.epoch, active, state.pagination.snapshot(), scope)
        };

        info!("Initial load of {} sources (epoch {})", active.len(), epoch);
        let mut outcome = self.orchestrator.fetch_all(&active, &states, &scope).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.epoch != epoch {
            debug!("Dropping initial load for epoch {}, now at {}", epoch, state.epoch);
            return Ok(LoadOutcome::Superseded);
        }

        let targets = content_types(&active);
        state.pagination.apply_outcome(&targets, &outcome.per_source);
        state.is_loading = false;

        if outcome.all_failed() {
            let message = outcome.error_summary();
            error!("Initial load failed for every source: {}", message);
            state.last_error = Some(message.clone());
            state.working_set.clear();
            self.render(state);
            return Err(AggregatorError::AllSourcesFailed {
                sources: targets.len(),
                message,
            });
        }

        let merge = MergeEngine::new(state.criteria.sort_order, self.priority.clone());
        state.working_set = merge.merge_and_sort(Vec::new(), std::mem::take(&mut outcome.items));
        state.last_error = partial_failure(&outcome);
        self.render(state);

        Ok(LoadOutcome::Loaded(LoadReport {
            new_items: state.working_set.len(),
            has_more: state.pagination.has_more(&targets),
            failed_sources: outcome.failed_sources(),
        }))
    }

    /// Fetch the next page of every active source that still has one.
    /// Pages are requested under the scope their cursors came from, even if
    /// the display sort changed since.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        let (epoch, targets, states, scope) = {
            let mut state = self.state.lock().await;
            if state.is_loading {
                debug!("Load already in flight, ignoring load_more");
                return Ok(LoadOutcome::Busy);
            }

            let targets: Vec<SourceConfig> = self
                .active_sources(&state.criteria)
                .into_iter()
                .filter(|source| state.pagination.can_load_more(&source.content_type))
                .collect();
            if targets.is_empty() {
                debug!("Every active source is exhausted");
                return Ok(LoadOutcome::Exhausted);
            }

            state.is_loading = true;
            state.pagination.mark_loading(&content_types(&targets));
            (
                state.epoch,
                targets,
                state.pagination.snapshot(),
                state.pagination.scope().clone(),
            )
        };

        debug!("load_more for {} sources, {} order", targets.len(), scope.sort_order.as_str());
        let mut outcome = self.orchestrator.fetch_all(&targets, &states, &scope).await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.epoch != epoch {
            debug!("Dropping load_more for epoch {}, now at {}", epoch, state.epoch);
            return Ok(LoadOutcome::Superseded);
        }

        let target_types = content_types(&targets);
        state.pagination.apply_outcome(&target_types, &outcome.per_source);
        state.is_loading = false;

        if outcome.all_failed() {
            let message = outcome.error_summary();
            warn!("Loading more failed for every source: {}", message);
            state.last_error = Some(message.clone());
            return Err(AggregatorError::LoadMoreFailed {
                sources: target_types.len(),
                message,
            });
        }

        let before = state.working_set.len();
        let existing = std::mem::take(&mut state.working_set);
        let merge = MergeEngine::new(state.criteria.sort_order, self.priority.clone());
        state.working_set = merge.merge_and_sort(existing, std::mem::take(&mut outcome.items));
        let added = state.working_set.len() - before;
        state.last_error = partial_failure(&outcome);
        self.render(state);

        let active = content_types(&self.active_sources(&state.criteria));
        let has_more = state.pagination.has_more(&active);
        info!("load_more added {} items (more: {})", added, has_more);

        if added == 0 && !has_more {
            return Ok(LoadOutcome::Exhausted);
        }
        Ok(LoadOutcome::Loaded(LoadReport {
            new_items: added,
            has_more,
            failed_sources: outcome.failed_sources(),
        }))
    }

    /// Replace the criteria. Changing the content type or date range reloads
    /// from scratch; sort and search changes reuse what is already loaded.
    pub async fn apply_filters(&self, criteria: FilterCriteria) -> Result<LoadOutcome> {
        criteria.date_range.validate(Utc::now())?;

        let reload = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let reload = state.criteria.requires_reload(&criteria);
            state.criteria = criteria;

            if reload {
                // In-flight loads were issued for the old criteria.
                state.epoch += 1;
            } else {
                let merge = MergeEngine::new(state.criteria.sort_order, self.priority.clone());
                let loaded = std::mem::take(&mut state.working_set);
                state.working_set = merge.merge_and_sort(loaded, Vec::new());
                self.render(state);
            }
            reload
        };

        if !reload {
            return Ok(LoadOutcome::Refiltered);
        }
        self.orchestrator.clear_cache().await;
        self.initial_load().await
    }

    /// Drop cached pages and error history, then load from scratch.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        self.orchestrator.clear_cache().await;
        self.orchestrator.reset_error_count();
        {
            let mut state = self.state.lock().await;
            state.last_error = None;
            state.epoch += 1;
        }
        self.initial_load().await
    }

    pub async fn view(&self) -> FeedView {
        let state = self.state.lock().await;
        let active = content_types(&self.active_sources(&state.criteria));
        FeedView {
            displayed_items: state.displayed.clone(),
            has_more_content: state.pagination.has_more(&active),
            is_loading: state.is_loading,
            last_error: state.last_error.clone(),
            error_count: self.orchestrator.error_count(),
        }
    }

    pub async fn criteria(&self) -> FilterCriteria {
        self.state.lock().await.criteria.clone()
    }

    /// Every loaded item, before filtering.
    pub async fn working_set_len(&self) -> usize {
        self.state.lock().await.working_set.len()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.orchestrator.fetcher().cache_stats().await
    }

    fn active_sources(&self, criteria: &FilterCriteria) -> Vec<SourceConfig> {
        self.sources
            .iter()
            .filter(|source| criteria.content_type.matches(&source.content_type))
            .cloned()
            .collect()
    }

    fn render(&self, state: &mut FeedState) {
        state.displayed = self.filter.apply(&state.working_set, &state.criteria, Utc::now());
        let active = content_types(&self.active_sources(&state.criteria));
        let has_more = state.pagination.has_more(&active);
        debug!(
            "Displaying {} of {} loaded items",
            state.displayed.len(),
            state.working_set.len()
        );
        state.sink.present(&state.displayed, has_more);
    }
}

fn content_types(sources: &[SourceConfig]) -> Vec<ContentType> {
    sources.iter().map(|s| s.content_type.clone()).collect()
}

fn partial_failure(outcome: &FetchAllOutcome) -> Option<String> {
    let failed = outcome.failed_sources();
    if failed.is_empty() {
        return None;
    }
    let names: Vec<String> = failed.iter().map(ContentType::to_string).collect();
    Some(format!(
        "Some sources failed to load ({}): {}",
        names.join(", "),
        outcome.error_summary()
    ))
}
