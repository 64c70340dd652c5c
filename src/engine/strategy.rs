// Binding strategies — how each kind of UI surface drives the shared engine.

use std::collections::BTreeMap;

use super::key::ParamValue;

pub const SORT_FIELD_KEY: &str = "sortField";
pub const SORT_ORDER_KEY: &str = "sortOrder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// A paginated table. Each lazy-load event replaces the visible rows with
    /// the requested page; the table is always considered active.
    TableLazyLoad,
    /// A dropdown with infinite scroll. Pages accumulate while the panel is
    /// open; nothing is fetched while it is closed.
    #[default]
    SelectScroll,
}

impl FetchStrategy {
    pub fn requires_open_surface(&self) -> bool {
        matches!(self, FetchStrategy::SelectScroll)
    }

    pub fn supports_scroll(&self) -> bool {
        matches!(self, FetchStrategy::SelectScroll)
    }

    pub fn supports_lazy_load(&self) -> bool {
        matches!(self, FetchStrategy::TableLazyLoad)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Page request emitted by a lazily loaded table.
#[derive(Debug, Clone, Default)]
pub struct LazyLoadEvent {
    /// Offset of the first requested row.
    pub first: u32,
    /// Rows per page.
    pub rows: u32,
    pub sort_field: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub filters: BTreeMap<String, ParamValue>,
}

impl LazyLoadEvent {
    pub fn new(first: u32, rows: u32) -> Self {
        Self {
            first,
            rows,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// 1-based page containing `first`.
    pub fn page(&self) -> u32 {
        self.first / self.rows.max(1) + 1
    }

    /// Sort and filter state as extra query parameters.
    pub fn to_params(&self) -> BTreeMap<String, ParamValue> {
        let mut params = self.filters.clone();
        if let Some(field) = &self.sort_field {
            params.insert(SORT_FIELD_KEY.to_string(), field.as_str().into());
            if let Some(order) = self.sort_order {
                params.insert(SORT_ORDER_KEY.to_string(), order.as_str().into());
            }
        }
        params
    }
}
