//! Single-file JSON store.
//!
//! All entries live in one JSON object on disk, loaded once at open and
//! rewritten atomically (temp file + rename) after every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use super::PersistentStore;
use crate::cache::SerializedEntry;
use crate::error::StoreError;

/// [`PersistentStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: Arc<PathBuf>,
    entries: Arc<RwLock<BTreeMap<String, SerializedEntry>>>,
    /// Serializes flushes so an older snapshot never overwrites a newer one.
    flush_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened JSON store {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path: Arc::new(path),
            entries: Arc::new(RwLock::new(entries)),
            flush_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;

        let bytes = {
            let entries = self.entries.read();
            serde_json::to_vec(&*entries)?
        };

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &*self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<SerializedEntry>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, entry: SerializedEntry) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), entry);
        self.flush().await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
