// Request coordinator — one in-flight fetch per engine, generation-based cancellation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::cache::ResponseCache;
use super::key::QueryKey;
use super::page::{Page, ResponseShape};
use super::stats::FetchStats;
use crate::error::FetchError;
use crate::transport::traits::Transport;

/// Identifies the generation a fetch was issued under.
#[derive(Clone)]
pub struct FetchTicket {
    pub generation: u64,
    token: CancellationToken,
}

impl FetchTicket {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct RequestCoordinator<T> {
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache<T>>,
    shape: ResponseShape,
    stats: Arc<FetchStats>,
    generation: AtomicU64,
    current_token: Mutex<CancellationToken>,
    shutdown_token: CancellationToken,
}

impl<T> RequestCoordinator<T> {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Option<ResponseCache<T>>,
        shape: ResponseShape,
        stats: Arc<FetchStats>,
    ) -> Self {
        Self {
            transport,
            cache,
            shape,
            stats,
            generation: AtomicU64::new(0),
            current_token: Mutex::new(CancellationToken::new()),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        !self.shutdown_token.is_cancelled() && self.generation() == generation
    }

    /// Abort whatever is in flight and start a new generation.
    pub fn supersede(&self) -> u64 {
        let mut token = self.current_token.lock();
        token.cancel();
        *token = self.shutdown_token.child_token();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("request generation advanced to {}", generation);
        generation
    }

    pub fn ticket(&self) -> FetchTicket {
        let token = self.current_token.lock().clone();
        FetchTicket {
            generation: self.generation(),
            token,
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache(&self) -> Option<&ResponseCache<T>> {
        self.cache.as_ref()
    }

    /// Cancel the in-flight fetch and refuse every later one.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.current_token.lock().cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}

impl<T> RequestCoordinator<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    /// Cache lookup; counts toward hit/miss stats only when caching is on.
    pub fn cached(&self, key: &QueryKey) -> Option<Page<T>> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(&key.cache_key());
        self.stats.record_cache_lookup(hit.is_some());
        if hit.is_some() {
            debug!("cache hit {}", key);
        }
        hit
    }

    /// Perform the network fetch for `key` under `ticket`.
    ///
    /// Returns [`FetchError::Aborted`] if the ticket's generation was
    /// superseded at any point before the response could be used.
    pub async fn execute(&self, key: &QueryKey, ticket: &FetchTicket) -> Result<Page<T>, FetchError> {
        if ticket.is_cancelled() {
            return Err(FetchError::Aborted);
        }

        let request = key.to_request();
        self.stats.record_transport_call();
        debug!("fetching {} generation={}", key, ticket.generation);

        let response = tokio::select! {
            response = self.transport.send(&request) => response,
            _ = ticket.token.cancelled() => {
                debug!("fetch cancelled {} generation={}", key, ticket.generation);
                return Err(FetchError::Aborted);
            }
        };

        if !self.is_current(ticket.generation) {
            return Err(FetchError::Aborted);
        }

        let page = self
            .shape
            .parse::<T>(response.map_err(FetchError::Transport)?)?;

        if let Some(cache) = &self.cache {
            cache.put(key.cache_key(), page.clone());
        }
        Ok(page)
    }
}
