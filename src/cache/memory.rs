//! Bounded in-memory cache around Moka.

use std::sync::Arc;

use moka::sync::Cache;

use super::CacheEntry;

/// In-memory cache of type-erased entries.
///
/// Moka only bounds the size; freshness is decided per entry on read, since
/// every key carries its own TTL.
///
/// Cloning is cheap and shares the same underlying cache.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Cache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Arc::new(Cache::builder().max_capacity(max_capacity).build()),
        }
    }

    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry) {
        self.inner.insert(key.into(), entry);
    }

    /// Get an entry if present and not expired.
    pub fn get_fresh(&self, key: &str) -> Option<CacheEntry> {
        self.inner.get(key).filter(CacheEntry::is_fresh)
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    /// Remove every key starting with `prefix`, returning the removed keys.
    pub fn invalidate_prefix(&self, prefix: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &keys {
            self.inner.invalidate(key);
        }
        keys
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(_, entry)| !entry.is_fresh())
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.inner.invalidate(key.as_str());
        }
        expired.len()
    }

    /// Number of stored entries, fresh or not.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry(value: u32, ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(value, Duration::from_secs(ttl_secs), false)
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache = MemoryCache::new(100);
        cache.insert("a", entry(1, 60));

        assert_eq!(cache.get_fresh("a").and_then(|e| e.value::<u32>()), Some(1));
        cache.invalidate("a");
        assert!(cache.get_fresh("a").is_none());
    }

    #[test]
    fn test_invalidate_prefix_leaves_other_keys() {
        let cache = MemoryCache::new(100);
        cache.insert("user-1", entry(1, 60));
        cache.insert("user-2", entry(2, 60));
        cache.insert("company-1", entry(3, 60));

        let mut removed = cache.invalidate_prefix("user-");
        removed.sort();

        assert_eq!(removed, vec!["user-1".to_string(), "user-2".to_string()]);
        assert!(cache.get_fresh("user-1").is_none());
        assert!(cache.get_fresh("company-1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_misses_and_purgeable() {
        let cache = MemoryCache::new(100);
        cache.insert("short", entry(1, 1));
        cache.insert("long", entry(2, 60));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(cache.get_fresh("short").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.entry_count(), 1);
        assert!(cache.get_fresh("long").is_some());
    }
}
