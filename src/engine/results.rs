// Accumulated rows across successive pages of one session.

use std::sync::Arc;

use crate::config::UNKNOWN_TOTAL;

use super::page::Page;

/// Rows live behind an `Arc` so published views share them. Appending
/// copies only while an older view still holds the previous rows.
pub struct AccumulatingResultSet<T> {
    items: Arc<Vec<T>>,
    total_count: i64,
    pages_merged: u32,
}

impl<T> Default for AccumulatingResultSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AccumulatingResultSet<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            total_count: UNKNOWN_TOTAL,
            pages_merged: 0,
        }
    }

    pub fn clear(&mut self) {
        self.items = Arc::new(Vec::new());
        self.total_count = UNKNOWN_TOTAL;
        self.pages_merged = 0;
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Cheap handle to the current rows.
    pub fn shared_items(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    /// Pages merged since the last clear, including empty ones.
    pub fn pages_merged(&self) -> u32 {
        self.pages_merged
    }
}

impl<T: Clone> AccumulatingResultSet<T> {
    /// Append a page in arrival order. The server's latest total always wins.
    pub fn append(&mut self, page: Page<T>) {
        self.total_count = i64::try_from(page.total_count).unwrap_or(i64::MAX);
        if !page.items.is_empty() {
            Arc::make_mut(&mut self.items).extend(page.items);
        }
        self.pages_merged += 1;
    }
}
