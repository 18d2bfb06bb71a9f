//! Per-call options.

use std::time::Duration;

use crate::cache::CacheTier;

/// Options for a single [`crate::Orchestrator::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// TTL for the cached result. `None` uses the configured default.
    pub ttl: Option<Duration>,

    /// Write the result through to the persistent store, and consult the
    /// store on an in-memory miss.
    pub persistent: bool,

    /// Read from and write to the cache. When false every call dispatches
    /// (still single-flight and throttled) and nothing is cached.
    pub use_cache: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            persistent: false,
            use_cache: true,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options caching for the given tier.
    pub fn with_tier(tier: CacheTier) -> Self {
        Self::default().ttl(tier)
    }

    /// Options that skip the cache entirely.
    pub fn bypass_cache() -> Self {
        Self::default().use_cache(false)
    }

    #[must_use]
    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }

    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_cache_without_persistence() {
        let options = ExecuteOptions::default();
        assert!(options.use_cache);
        assert!(!options.persistent);
        assert_eq!(options.ttl, None);
    }

    #[test]
    fn test_tier_and_flags() {
        let options = ExecuteOptions::with_tier(CacheTier::VeryLong).persistent(true);
        assert_eq!(options.ttl, Some(Duration::from_secs(3600)));
        assert!(options.persistent);
        assert!(!ExecuteOptions::bypass_cache().use_cache);
    }
}
