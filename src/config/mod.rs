//! Orchestrator configuration.
//!
//! Defaults suit an interactive client; every value can be overridden in
//! code through the builder setters or from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheTier;

/// Tunables for an [`crate::Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Minimum spacing between two producer dispatches for the same key.
    pub min_interval: Duration,

    /// Additional attempts after a rate-limited failure.
    pub max_retries: u32,

    /// Backoff before the first retry; doubled for each further retry.
    pub initial_backoff: Duration,

    /// TTL applied when a call does not choose one.
    pub default_ttl: Duration,

    /// Maximum number of in-memory cache entries.
    pub max_capacity: u64,

    /// Prefix for keys written to the persistent store, so cache entries
    /// can share a store with other application data.
    pub store_namespace: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(200),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            default_ttl: CacheTier::Short.duration(),
            max_capacity: 10_000,
            store_namespace: "flightdeck:".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables (and `.env`).
    ///
    /// Recognised variables:
    /// - `FLIGHTDECK_MIN_INTERVAL_MS`
    /// - `FLIGHTDECK_MAX_RETRIES`
    /// - `FLIGHTDECK_INITIAL_BACKOFF_MS`
    /// - `FLIGHTDECK_DEFAULT_TTL_SECS` (seconds, or a tier name such as `medium`)
    /// - `FLIGHTDECK_MAX_CAPACITY`
    /// - `FLIGHTDECK_STORE_NAMESPACE`
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let default_ttl = match env::var("FLIGHTDECK_DEFAULT_TTL_SECS") {
            Ok(raw) => match CacheTier::from_name(&raw) {
                Some(tier) => tier.duration(),
                None => parse_value::<u64>("FLIGHTDECK_DEFAULT_TTL_SECS", &raw)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.default_ttl),
            },
            Err(_) => defaults.default_ttl,
        };

        Self {
            min_interval: env_parse::<u64>("FLIGHTDECK_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            max_retries: env_parse("FLIGHTDECK_MAX_RETRIES").unwrap_or(defaults.max_retries),
            initial_backoff: env_parse::<u64>("FLIGHTDECK_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            default_ttl,
            max_capacity: env_parse("FLIGHTDECK_MAX_CAPACITY").unwrap_or(defaults.max_capacity),
            store_namespace: env::var("FLIGHTDECK_STORE_NAMESPACE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.store_namespace),
        }
    }

    #[must_use]
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    #[must_use]
    pub fn default_ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.default_ttl = ttl.into();
        self
    }

    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    #[must_use]
    pub fn store_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.store_namespace = namespace.into();
        self
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    parse_value(name, &raw)
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(200));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.default_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_setters() {
        let config = OrchestratorConfig::default()
            .min_interval(Duration::ZERO)
            .max_retries(5)
            .default_ttl(CacheTier::Long)
            .store_namespace("app.cache.");
        assert_eq!(config.min_interval, Duration::ZERO);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_ttl, Duration::from_secs(1800));
        assert_eq!(config.store_namespace, "app.cache.");
    }

    #[test]
    fn test_from_env_reads_tiers_and_skips_bad_values() {
        // Only this test touches FLIGHTDECK_* variables.
        // SAFETY: no other thread reads or writes these variables.
        unsafe {
            env::set_var("FLIGHTDECK_DEFAULT_TTL_SECS", "medium");
            env::set_var("FLIGHTDECK_MAX_RETRIES", "abc");
            env::set_var("FLIGHTDECK_MIN_INTERVAL_MS", "50");
        }

        let config = OrchestratorConfig::from_env();

        // SAFETY: as above.
        unsafe {
            env::remove_var("FLIGHTDECK_DEFAULT_TTL_SECS");
            env::remove_var("FLIGHTDECK_MAX_RETRIES");
            env::remove_var("FLIGHTDECK_MIN_INTERVAL_MS");
        }

        assert_eq!(config.default_ttl, CacheTier::Medium.duration());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.min_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        assert_eq!(parse_value::<u32>("X", " 7 "), Some(7));
        assert_eq!(parse_value::<u32>("X", "seven"), None);
    }
}
