use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::key::ParamValue;
use crate::transport::traits::HttpMethod;

/// Default number of rows requested per page.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// Quiet window a search input must observe before it is considered settled.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default lifetime of a cached page, and the interval of the cache sweep.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 60;

/// Default response key holding the data array.
pub const DEFAULT_DATA_KEY: &str = "payload";

/// Default response key holding the total record count.
pub const DEFAULT_COUNT_KEY: &str = "totalCount";

/// Default query-string key carrying the settled search term.
pub const DEFAULT_SEARCH_KEY: &str = "search";

/// Sentinel used for a total count the server has not reported yet.
pub const UNKNOWN_TOTAL: i64 = -1;

/// Construction-time configuration for a [`PagedFetchEngine`](crate::PagedFetchEngine).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// URL (or path understood by the transport) of the paged resource.
    pub resource_locator: String,
    /// Request method used for every page fetch.
    pub method: HttpMethod,
    /// Page size.
    pub limit: u32,
    /// Debounce interval for raw search input, in milliseconds.
    pub debounce_ms: u64,
    /// Whether successful pages are memoized.
    pub cache_enabled: bool,
    /// Cache entry lifetime and sweep interval, in seconds.
    pub cache_ttl_seconds: u64,
    /// Disables the periodic sweep; `clear_cache` still works.
    pub disable_ttl_sweep: bool,
    /// Fetch only once a non-empty search term has settled.
    pub search_only: bool,
    pub data_key: String,
    pub count_key: String,
    pub search_key: String,
    /// Initial extra query parameters.
    pub params: BTreeMap<String, ParamValue>,
    /// Initial request body for POST fetches.
    pub body: Option<Value>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resource_locator: String::new(),
            method: HttpMethod::Get,
            limit: DEFAULT_PAGE_LIMIT,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            cache_enabled: true,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            disable_ttl_sweep: false,
            search_only: false,
            data_key: DEFAULT_DATA_KEY.to_string(),
            count_key: DEFAULT_COUNT_KEY.to_string(),
            search_key: DEFAULT_SEARCH_KEY.to_string(),
            params: BTreeMap::new(),
            body: None,
        }
    }
}

impl EngineConfig {
    pub fn new(resource_locator: impl Into<String>) -> Self {
        Self {
            resource_locator: resource_locator.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid engine config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(anyhow!("limit must be > 0"));
        }
        if self.data_key.is_empty() || self.count_key.is_empty() {
            return Err(anyhow!("data_key and count_key must not be empty"));
        }
        if self.search_key.is_empty() {
            return Err(anyhow!("search_key must not be empty"));
        }
        if self.cache_enabled && !self.disable_ttl_sweep && self.cache_ttl_seconds == 0 {
            return Err(anyhow!(
                "cache_ttl_seconds must be > 0 unless the TTL sweep is disabled"
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = seconds;
        self
    }

    pub fn without_ttl_sweep(mut self) -> Self {
        self.disable_ttl_sweep = true;
        self
    }

    pub fn with_search_only(mut self, search_only: bool) -> Self {
        self.search_only = search_only;
        self
    }

    /// Override the response keys holding the data array and the total count.
    pub fn with_response_keys(
        mut self,
        data_key: impl Into<String>,
        count_key: impl Into<String>,
    ) -> Self {
        self.data_key = data_key.into();
        self.count_key = count_key.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
