//! Orchestrator counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of orchestrator activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// Calls answered from memory or the persistent store.
    pub hits: u64,
    /// Calls that consulted the cache and found nothing fresh.
    pub misses: u64,
    /// Calls that joined a request already in flight.
    pub joins: u64,
    /// Producer invocations, retries included.
    pub dispatches: u64,
    /// Rate-limited attempts that were retried.
    pub retries: u64,
    /// Requests that exhausted their retries and resolved empty.
    pub degraded: u64,
    /// In-memory entries currently held (fresh or not).
    pub entries: u64,
}

impl OrchestratorStats {
    /// Fraction of cache lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
    dispatches: AtomicU64,
    retries: AtomicU64,
    degraded: AtomicU64,
}

impl Counters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn join(&self) {
        self.joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn degrade(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entries: u64) -> OrchestratorStats {
        OrchestratorStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            entries,
        }
    }
}
