//! Cache entries, in memory and serialized.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Type-erased cached value. One orchestrator caches many value types.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// An in-memory cache entry.
///
/// Valid while `now - stored_at < ttl`; afterwards it is treated exactly
/// like a missing entry.
#[derive(Clone)]
pub struct CacheEntry {
    value: ErasedValue,
    type_name: &'static str,
    stored_at_millis: i64,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    ttl: Duration,
    persistent: bool,
}

impl CacheEntry {
    /// Create an entry stored now.
    pub fn new<T>(value: T, ttl: Duration, persistent: bool) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            stored_at_millis: now_millis(),
            expires_at: Instant::now().checked_add(ttl),
            ttl,
            persistent,
        }
    }

    /// Rebuild an entry loaded from the persistent store.
    ///
    /// Keeps the original `storedAt`, so the entry expires in memory at the
    /// same moment it expires in the store.
    pub fn hydrate<T>(value: T, serialized: &SerializedEntry) -> Self
    where
        T: Send + Sync + 'static,
    {
        let remaining = serialized.remaining_at(now_millis());
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            stored_at_millis: serialized.stored_at,
            expires_at: Instant::now().checked_add(remaining),
            ttl: serialized.ttl(),
            persistent: true,
        }
    }

    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.expires_at.is_none_or(|expires_at| Instant::now() < expires_at)
    }

    /// Clone the value out if it has type `T`.
    pub fn value<T>(&self) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.value.downcast_ref::<T>().cloned()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn stored_at_millis(&self) -> i64 {
        self.stored_at_millis
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("type_name", &self.type_name)
            .field("stored_at_millis", &self.stored_at_millis)
            .field("ttl", &self.ttl)
            .field("persistent", &self.persistent)
            .field("fresh", &self.is_fresh())
            .finish()
    }
}

/// Entry format exchanged with a [`crate::PersistentStore`].
///
/// Serializes as `{ "value": <json>, "storedAt": <epoch ms>, "ttlMillis": <ms> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEntry {
    pub value: serde_json::Value,
    pub stored_at: i64,
    pub ttl_millis: u64,
}

impl SerializedEntry {
    pub fn new(value: serde_json::Value, stored_at: i64, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl_millis: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Serialize `value` as stored at `stored_at` (epoch ms).
    pub fn encode<T: Serialize>(value: &T, stored_at: i64, ttl: Duration) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(value)?, stored_at, ttl))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    /// Time left before expiry at `now` (epoch ms). Zero once expired.
    ///
    /// A `storedAt` in the future (clock skew) counts as stored at `now`.
    pub fn remaining_at(&self, now: i64) -> Duration {
        let age = u64::try_from(now.saturating_sub(self.stored_at)).unwrap_or(0);
        Duration::from_millis(self.ttl_millis.saturating_sub(age))
    }

    pub fn is_fresh_at(&self, now: i64) -> bool {
        !self.remaining_at(now).is_zero()
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(now_millis())
    }
}
