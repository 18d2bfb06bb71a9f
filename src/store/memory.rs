//! In-memory store, for tests and platforms without durable storage.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::PersistentStore;
use crate::cache::SerializedEntry;
use crate::error::StoreError;

/// Process-local [`PersistentStore`].
///
/// Clones share the same map, so two orchestrators built over clones of one
/// `MemoryStore` behave like two app launches over the same device storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, SerializedEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synchronous read, for assertions.
    pub fn peek(&self, key: &str) -> Option<SerializedEntry> {
        self.entries.get(key).map(|e| e.clone())
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<SerializedEntry>, StoreError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, entry: SerializedEntry) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}
