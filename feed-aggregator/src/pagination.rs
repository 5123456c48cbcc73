use crate::orchestrator::SourceOutcome;
use crate::types::{ContentType, PageScope, PaginationState};
use std::collections::HashMap;

/// Per-source cursor bookkeeping, plus the scope the current cursors were
/// issued under.
#[derive(Debug, Clone, Default)]
pub struct PaginationController {
    states: HashMap<ContentType, PaginationState>,
    scope: PageScope,
}

impl PaginationController {
    pub fn new(sources: impl IntoIterator<Item = ContentType>) -> Self {
        Self {
            states: sources
                .into_iter()
                .map(|content_type| (content_type, PaginationState::default()))
                .collect(),
            scope: PageScope::default(),
        }
    }

    /// Back to the first page for every source; the next chain runs under `scope`.
    pub fn reset_all(&mut self, scope: PageScope) {
        for state in self.states.values_mut() {
            *state = PaginationState::default();
        }
        self.scope = scope;
    }

    pub fn scope(&self) -> &PageScope {
        &self.scope
    }

    /// Unknown sources have never been fetched, so they can.
    pub fn can_load_more(&self, content_type: &ContentType) -> bool {
        self.states
            .get(content_type)
            .map_or(true, PaginationState::can_load_more)
    }

    pub fn mark_loading(&mut self, sources: &[ContentType]) {
        for content_type in sources {
            self.states.entry(content_type.clone()).or_default().begin();
        }
    }

    /// Fold one round of fetch results back into the states. Sources marked
    /// loading but missing from `outcomes` are released unchanged.
    pub fn apply_outcome(&mut self, targets: &[ContentType], outcomes: &HashMap<ContentType, SourceOutcome>) {
        for content_type in targets {
            let state = self.states.entry(content_type.clone()).or_default();
            match outcomes.get(content_type) {
                Some(outcome) if outcome.is_failure() => state.fail(),
                Some(outcome) => state.complete(outcome.next_cursor.clone(), outcome.fetched),
                None => state.loading = false,
            }
        }
    }

    /// Aggregate: false exactly when every active source is exhausted.
    pub fn has_more(&self, active: &[ContentType]) -> bool {
        active.iter().any(|content_type| {
            self.states
                .get(content_type)
                .map_or(true, |state| state.has_more)
        })
    }

    pub fn is_loading(&self) -> bool {
        self.states.values().any(|state| state.loading)
    }

    pub fn snapshot(&self) -> HashMap<ContentType, PaginationState> {
        self.states.clone()
    }
}
