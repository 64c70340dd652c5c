// Pagination cursor — page/limit position plus load flags for the current session.

use crate::config::UNKNOWN_TOTAL;

/// Observable load state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadState {
    /// 1-based page the cursor points at.
    pub page: u32,
    pub limit: u32,
    /// Latest server-reported total, or [`UNKNOWN_TOTAL`].
    pub total_count: i64,
    pub all_loaded: bool,
    pub loading: bool,
    pub last_call_succeeded: bool,
}

impl LoadState {
    pub fn total_known(&self) -> bool {
        self.total_count >= 0
    }
}

pub struct PaginationCursor {
    state: LoadState,
}

impl PaginationCursor {
    pub fn new(limit: u32) -> Self {
        Self {
            state: LoadState {
                page: 1,
                limit: limit.max(1),
                total_count: UNKNOWN_TOTAL,
                all_loaded: false,
                loading: false,
                last_call_succeeded: true,
            },
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn page(&self) -> u32 {
        self.state.page
    }

    pub fn limit(&self) -> u32 {
        self.state.limit
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn all_loaded(&self) -> bool {
        self.state.all_loaded
    }

    pub fn last_call_succeeded(&self) -> bool {
        self.state.last_call_succeeded
    }

    /// Move to the next page, but only if the fetch for the current page
    /// succeeded. A failed page is retried instead of skipped.
    pub fn advance_to_next_page(&mut self) -> bool {
        if !self.state.last_call_succeeded {
            return false;
        }
        self.state.page = self.state.page.saturating_add(1);
        true
    }

    /// Position the cursor at an arbitrary page (table lazy loading).
    pub fn jump_to(&mut self, page: u32, limit: u32) {
        self.state.page = page.max(1);
        self.state.limit = limit.max(1);
    }

    pub fn reset(&mut self) {
        self.state.page = 1;
        self.state.total_count = UNKNOWN_TOTAL;
        self.state.all_loaded = false;
        self.state.loading = false;
        self.state.last_call_succeeded = true;
    }

    pub fn begin_fetch(&mut self) {
        self.state.loading = true;
    }

    pub fn finish_fetch(&mut self, succeeded: bool) {
        self.state.loading = false;
        self.state.last_call_succeeded = succeeded;
    }

    pub fn recompute_all_loaded(&mut self, item_count: usize, total_count: i64) {
        self.state.total_count = total_count;
        self.state.all_loaded = total_count >= 0 && item_count as i64 >= total_count;
    }
}
