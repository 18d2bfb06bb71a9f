//! Per-key dispatch pacing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Tracks the last dispatch per key and enforces a minimum spacing.
///
/// Only the task that owns a key's in-flight record waits and records here,
/// so reads and writes for one key never race.
#[derive(Debug, Clone)]
pub struct DispatchThrottle {
    last_dispatch: Arc<DashMap<String, Instant>>,
    min_interval: Duration,
}

impl DispatchThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_dispatch: Arc::new(DashMap::new()),
            min_interval,
        }
    }

    /// How long a dispatch for `key` must wait right now.
    pub fn wait_time(&self, key: &str) -> Duration {
        self.last_dispatch
            .get(key)
            .map(|last| self.min_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    /// Sleep until `key` may be dispatched again.
    pub async fn wait_turn(&self, key: &str) {
        let wait = self.wait_time(key);
        if !wait.is_zero() {
            debug!("Throttling {} for {:?}", key, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a dispatch for `key` at the current instant.
    pub fn record_dispatch(&self, key: &str) {
        self.last_dispatch.insert(key.to_string(), Instant::now());
    }

    pub fn last_dispatch(&self, key: &str) -> Option<Instant> {
        self.last_dispatch.get(key).map(|t| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_dispatch_is_immediate() {
        let throttle = DispatchThrottle::new(Duration::from_millis(200));
        assert_eq!(throttle.wait_time("k"), Duration::ZERO);
        assert!(throttle.last_dispatch("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_turn_spaces_dispatches() {
        let throttle = DispatchThrottle::new(Duration::from_millis(200));
        throttle.record_dispatch("k");
        let first = Instant::now();

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(throttle.wait_time("k"), Duration::from_millis(150));
        assert_eq!(throttle.wait_time("other"), Duration::ZERO);

        throttle.wait_turn("k").await;
        assert!(first.elapsed() >= Duration::from_millis(200));
        assert_eq!(throttle.wait_time("k"), Duration::ZERO);
    }
}
