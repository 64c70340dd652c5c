// Fetch counters — transport calls, cache effectiveness, discarded and failed responses.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchStatsSnapshot {
    pub transport_calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub discarded: u64,
    pub failures: u64,
    pub items_merged: u64,
    pub resets: u64,
    pub cache_hit_rate: f64,
}

#[derive(Default)]
pub struct FetchStats {
    transport_calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    discarded: AtomicU64,
    failures: AtomicU64,
    items_merged: AtomicU64,
    resets: AtomicU64,
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transport_call(&self) {
        self.transport_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merged(&self, items: usize) {
        self.items_merged.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_calls(&self) -> u64 {
        self.transport_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FetchStatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups > 0 {
            cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        FetchStatsSnapshot {
            transport_calls: self.transport_calls(),
            cache_hits,
            cache_misses,
            discarded: self.discarded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            items_merged: self.items_merged.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}
