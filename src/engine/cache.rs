// In-memory page cache with TTL expiry and a periodic full sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::page::Page;

struct CacheEntry<T> {
    page: Page<T>,
    inserted_at: Instant,
}

struct CacheInner<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    ttl: Option<Duration>,
    sweep_token: CancellationToken,
    sweeper_started: AtomicBool,
    sweeps: AtomicU64,
}

impl<T> Drop for CacheInner<T> {
    fn drop(&mut self) {
        self.sweep_token.cancel();
    }
}

/// Memoizes pages by their canonical request key.
///
/// Cloning yields another handle to the same store, which is how a cache is
/// shared between engines. The sweep task only holds a weak reference, so
/// dropping the last handle stops it.
pub struct ResponseCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for ResponseCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ResponseCache<T> {
    pub fn clear(&self) {
        let evicted = {
            let mut entries = self.inner.entries.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        if evicted > 0 {
            debug!("response cache cleared ({} entries)", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.inner.ttl
    }

    /// Number of sweeps that have run so far.
    pub fn sweep_count(&self) -> u64 {
        self.inner.sweeps.load(Ordering::Relaxed)
    }

    /// Stop the sweep task. Manual `clear` keeps working.
    pub fn stop_sweeper(&self) {
        self.inner.sweep_token.cancel();
    }
}

impl<T: Clone + Send + 'static> ResponseCache<T> {
    /// `ttl` of `None` keeps entries until [`clear`](Self::clear).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                ttl: ttl.filter(|d| !d.is_zero()),
                sweep_token: CancellationToken::new(),
                sweeper_started: AtomicBool::new(false),
                sweeps: AtomicU64::new(0),
            }),
        }
    }

    /// Look up a page. Entries older than the TTL count as absent.
    pub fn get(&self, key: &str) -> Option<Page<T>> {
        let mut entries = self.inner.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => self
                .inner
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.page.clone())
    }

    pub fn put(&self, key: String, page: Page<T>) {
        let entry = CacheEntry {
            page,
            inserted_at: Instant::now(),
        };
        self.inner.entries.lock().insert(key, entry);
    }

    /// Start clearing the whole cache every TTL interval. Idempotent; a no-op
    /// without a TTL. Errors outside a Tokio runtime.
    pub fn start_sweeper(&self) -> Result<()> {
        let Some(ttl) = self.inner.ttl else {
            return Ok(());
        };
        let handle = Handle::try_current()
            .map_err(|e| anyhow!("cache sweeper needs a tokio runtime: {}", e))?;
        if self.inner.sweeper_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let weak: Weak<CacheInner<T>> = Arc::downgrade(&self.inner);
        let token = self.inner.sweep_token.clone();

        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + ttl, ttl);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = token.cancelled() => {
                        debug!("response cache sweeper stopped");
                        return;
                    }
                }

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let evicted = {
                    let mut entries = inner.entries.lock();
                    let n = entries.len();
                    entries.clear();
                    n
                };
                inner.sweeps.fetch_add(1, Ordering::Relaxed);
                debug!("response cache sweep evicted {} entries", evicted);
            }
        });
        Ok(())
    }
}
