//! The request orchestrator.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::flight::{Claim, FlightFuture, FlightMap, Settled};
use super::options::ExecuteOptions;
use super::retry::{self, Attempted, RetryPolicy};
use super::stats::{Counters, OrchestratorStats};
use super::throttle::DispatchThrottle;
use crate::cache::{CacheEntry, MemoryCache, SerializedEntry, now_millis};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::store::PersistentStore;

/// What a call resolved to.
///
/// `Degraded` means the producer was still rate limited after every retry.
/// It is distinct from an error so callers can show "no data" instead of a
/// failure; [`Orchestrator::execute`] turns it into `T::default()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Value(T),
    Degraded,
}

impl<T> Outcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Degraded => None,
        }
    }

    /// The value, or `T::default()` when degraded.
    pub fn unwrap_or_empty(self) -> T
    where
        T: Default,
    {
        self.into_value().unwrap_or_default()
    }
}

/// Key-addressed request engine.
///
/// Sits between call sites and remote calls, providing single-flight
/// deduplication, per-key TTL caching with optional persistence, per-key
/// throttling, and backoff on rate limiting.
///
/// Construct one at startup and share it; cloning is cheap and clones share
/// all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    memory: MemoryCache,
    store: Option<Arc<dyn PersistentStore>>,
    flights: FlightMap,
    throttle: DispatchThrottle,
    policy: RetryPolicy,
    counters: Counters,
}

impl Orchestrator {
    /// Create an orchestrator without persistence.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::build(config, None)
    }

    /// Create an orchestrator that writes persistent entries to `store`.
    pub fn with_store(config: OrchestratorConfig, store: Arc<dyn PersistentStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: OrchestratorConfig, store: Option<Arc<dyn PersistentStore>>) -> Self {
        info!(
            "Request orchestrator initialized (min interval {:?}, {} retries, persistence {})",
            config.min_interval,
            config.max_retries,
            if store.is_some() { "on" } else { "off" }
        );

        let inner = Inner {
            memory: MemoryCache::new(config.max_capacity),
            store,
            flights: FlightMap::new(),
            throttle: DispatchThrottle::new(config.min_interval),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                initial_backoff: config.initial_backoff,
            },
            counters: Counters::default(),
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Get the value for `key`, from cache, from a request already in flight,
    /// or by invoking `producer`.
    ///
    /// Resolves to:
    /// - the value, when cached or produced;
    /// - `T::default()`, when the producer stayed rate limited through every
    ///   retry (use [`Self::execute_outcome`] to tell this apart);
    /// - an error, when the producer failed any other way.
    pub async fn execute<T, F, Fut>(&self, key: &str, producer: F, options: ExecuteOptions) -> Result<T>
    where
        T: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.execute_outcome(key, producer, options)
            .await
            .map(Outcome::unwrap_or_empty)
    }

    /// Like [`Self::execute`], but reports rate-limit exhaustion as
    /// [`Outcome::Degraded`].
    pub async fn execute_outcome<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: ExecuteOptions,
    ) -> Result<Outcome<T>>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(OrchestratorError::EmptyKey);
        }

        if options.use_cache {
            if let Some(value) = self.lookup_memory::<T>(key) {
                self.inner.counters.hit();
                debug!("Cache hit for {}", key);
                return Ok(Outcome::Value(value));
            }

            if options.persistent
                && let Some(value) = self.lookup_store::<T>(key).await
            {
                self.inner.counters.hit();
                debug!("Persistent cache hit for {}", key);
                return Ok(Outcome::Value(value));
            }

            self.inner.counters.miss();
            debug!("Cache miss for {}", key);
        }

        let claim = self.inner.flights.join_or_lead::<T, T>(
            key,
            || {
                options
                    .use_cache
                    .then(|| self.lookup_memory::<T>(key))
                    .flatten()
            },
            |id| self.launch(key.to_string(), id, producer, options),
        )?;

        let future = match claim {
            Claim::Cached(value) => {
                self.inner.counters.hit();
                return Ok(Outcome::Value(value));
            }
            Claim::Joined(future) => {
                self.inner.counters.join();
                debug!("Joining in-flight request for {}", key);
                future
            }
            Claim::Led(future) => future,
        };

        match future.await? {
            Settled::Value(value) => value
                .downcast_ref::<T>()
                .cloned()
                .map(Outcome::Value)
                .ok_or_else(|| OrchestratorError::TypeMismatch {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                    in_flight: "unknown",
                }),
            Settled::Degraded => Ok(Outcome::Degraded),
        }
    }

    /// Remove the cache entry for `key`, in memory and in the store.
    ///
    /// A request already in flight for `key` is not cancelled; its result is
    /// cached when it settles.
    pub async fn invalidate(&self, key: &str) {
        self.inner.memory.invalidate(key);

        if let Some(store) = &self.inner.store {
            let store_key = self.store_key(key);
            if let Err(e) = store.remove(&store_key).await {
                warn!("Failed to remove persisted entry {}: {}", key, e);
            }
        }
        debug!("Invalidated {}", key);
    }

    /// Remove every cache entry whose key starts with `prefix`.
    ///
    /// Returns the number of distinct keys removed across memory and store.
    pub async fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let mut removed: BTreeSet<String> =
            self.inner.memory.invalidate_prefix(prefix).into_iter().collect();

        if let Some(store) = &self.inner.store {
            let full_prefix = self.store_key(prefix);
            removed.extend(self.remove_persisted(store.as_ref(), &full_prefix).await);
        }

        info!("Invalidated {} entries with prefix {:?}", removed.len(), prefix);
        removed.len()
    }

    /// Remove every cache entry, including all persisted entries in this
    /// orchestrator's namespace.
    pub async fn clear(&self) {
        self.inner.memory.invalidate_all();

        if let Some(store) = &self.inner.store {
            let namespace = self.inner.config.store_namespace.clone();
            let removed = self.remove_persisted(store.as_ref(), &namespace).await;
            debug!("Cleared {} persisted entries", removed.len());
        }
        info!("Cache cleared");
    }

    /// Drop expired in-memory entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let purged = self.inner.memory.purge_expired();
        if purged > 0 {
            debug!("Purged {} expired entries", purged);
        }
        purged
    }

    /// Whether a producer call for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.flights.contains(key)
    }

    /// Number of producer calls currently running.
    pub fn in_flight_count(&self) -> usize {
        self.inner.flights.len()
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.inner
            .counters
            .snapshot(self.inner.memory.entry_count())
    }

    /// Spawn the producer task for a new flight and wrap it as a shared
    /// future.
    ///
    /// The task runs detached, so callers that stop waiting do not stop the
    /// request or its cache write.
    fn launch<T, F, Fut>(&self, key: String, id: u64, producer: F, options: ExecuteOptions) -> FlightFuture
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let this = self.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let key = task_key;
            let _flight = FlightGuard {
                orchestrator: this.clone(),
                key: key.clone(),
                id,
            };
            this.dispatch(&key, producer, options).await
        });

        async move {
            match handle.await {
                Ok(settled) => settled,
                Err(join_err) => {
                    warn!("Producer for {} aborted: {}", key, join_err);
                    Err(OrchestratorError::Aborted { key })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Throttle, run the producer under the retry policy, and cache the
    /// result.
    async fn dispatch<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: ExecuteOptions,
    ) -> Result<Settled>
    where
        T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let inner = &self.inner;
        inner.throttle.wait_turn(key).await;

        let attempted = retry::run(key, inner.policy, &inner.throttle, &inner.counters, producer).await;

        match attempted {
            Ok(Attempted::Value(value)) => {
                if options.use_cache {
                    let ttl = options.ttl.unwrap_or(inner.config.default_ttl);
                    self.store_value(key, &value, ttl, options.persistent).await;
                }
                Ok(Settled::Value(Arc::new(value)))
            }
            Ok(Attempted::Exhausted) => {
                inner.counters.degrade();
                Ok(Settled::Degraded)
            }
            Err(err) => {
                debug!("Producer for {} failed: {:#}", key, err);
                Err(OrchestratorError::Producer(Arc::new(err)))
            }
        }
    }

    fn lookup_memory<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let entry = self.inner.memory.get_fresh(key)?;
        let value = entry.value::<T>();
        if value.is_none() {
            debug!(
                "Cached {} holds {}, not {}; treating as miss",
                key,
                entry.type_name(),
                std::any::type_name::<T>()
            );
        }
        value
    }

    /// Read `key` from the persistent store, hydrating memory on a hit.
    ///
    /// Expired or undecodable entries are removed. Store failures are logged
    /// and reported as a miss.
    async fn lookup_store<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + DeserializeOwned + Send + Sync + 'static,
    {
        let store = self.inner.store.as_ref()?;
        let store_key = self.store_key(key);

        let serialized = match store.get(&store_key).await {
            Ok(found) => found?,
            Err(e) => {
                warn!("Persistent read for {} failed: {}", key, e);
                return None;
            }
        };

        if !serialized.is_fresh_at(now_millis()) {
            debug!("Persisted entry for {} expired", key);
            self.discard_stale(key, store.as_ref(), serialized.stored_at).await;
            return None;
        }

        match serialized.decode::<T>() {
            Ok(value) => {
                self.inner
                    .memory
                    .insert(key, CacheEntry::hydrate(value.clone(), &serialized));
                Some(value)
            }
            Err(e) => {
                warn!("Discarding undecodable persisted entry for {}: {}", key, e);
                self.discard_stale(key, store.as_ref(), serialized.stored_at).await;
                None
            }
        }
    }

    /// Write a produced value to memory and, when requested, through to the
    /// store.
    async fn store_value<T>(&self, key: &str, value: &T, ttl: Duration, persistent: bool)
    where
        T: Clone + Serialize + Send + Sync + 'static,
    {
        let store = self.inner.store.as_ref().filter(|_| persistent);
        let entry = CacheEntry::new(value.clone(), ttl, store.is_some());
        let stored_at = entry.stored_at_millis();
        self.inner.memory.insert(key, entry);

        let Some(store) = store else {
            return;
        };

        let serialized = match SerializedEntry::encode(value, stored_at, ttl) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("Cannot persist {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = store.set(&self.store_key(key), serialized).await {
            warn!("Persistent write for {} failed: {}", key, e);
        }
    }

    /// Remove the persisted entry for `key` if it is still the one stored at
    /// `stored_at`.
    ///
    /// A flight on the same key may have written a fresh entry since it was
    /// read; that entry is left alone.
    async fn discard_stale(&self, key: &str, store: &dyn PersistentStore, stored_at: i64) {
        if self.inner.flights.contains(key) {
            return;
        }

        let store_key = self.store_key(key);
        match store.get(&store_key).await {
            Ok(Some(current)) if current.stored_at == stored_at => {}
            Ok(Some(_)) => {
                debug!("Persisted entry {} was rewritten, keeping it", store_key);
                return;
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Persistent read for {} failed: {}", store_key, e);
                return;
            }
        }

        if let Err(e) = store.remove(&store_key).await {
            warn!("Failed to remove persisted entry {}: {}", store_key, e);
        }
    }

    /// Remove persisted entries whose store key starts with `store_prefix`.
    /// Returns the removed keys without the namespace.
    async fn remove_persisted(&self, store: &dyn PersistentStore, store_prefix: &str) -> Vec<String> {
        let keys = match store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Listing persisted keys failed: {}", e);
                return Vec::new();
            }
        };

        let namespace = &self.inner.config.store_namespace;
        let mut removed = Vec::new();
        for store_key in keys.iter().filter(|k| k.starts_with(store_prefix)) {
            match store.remove(store_key).await {
                Ok(()) => {
                    if let Some(key) = store_key.strip_prefix(namespace.as_str()) {
                        removed.push(key.to_string());
                    }
                }
                Err(e) => warn!("Failed to remove persisted entry {}: {}", store_key, e),
            }
        }
        removed
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.config.store_namespace, key)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("memory", &self.inner.memory)
            .field("in_flight", &self.inner.flights.len())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}

/// Removes the in-flight record when the producer task ends, panics
/// included.
struct FlightGuard {
    orchestrator: Orchestrator,
    key: String,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.orchestrator.inner.flights.finish(&self.key, self.id);
    }
}
