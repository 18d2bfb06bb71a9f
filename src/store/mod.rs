//! Persistent store adapters.
//!
//! The orchestrator never owns a storage engine. It writes
//! [`SerializedEntry`] envelopes through this narrow capability trait so the
//! backing key-value store can be swapped per platform.

mod file;
mod memory;

use async_trait::async_trait;

use crate::cache::SerializedEntry;
use crate::error::StoreError;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Key-value store for cache entries that must survive a restart.
///
/// Concurrent writes to one key are last-write-wins.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Get an entry by key.
    async fn get(&self, key: &str) -> Result<Option<SerializedEntry>, StoreError>;

    /// Insert or replace an entry.
    async fn set(&self, key: &str, entry: SerializedEntry) -> Result<(), StoreError>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
