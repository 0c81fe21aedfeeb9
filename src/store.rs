// Persistent cache tier: a durable key/value store with a best-effort
// contract. The cache layer treats every operation here as optional; a
// failing store degrades that tier only and must never abort a fetch.

use crate::error::StoreError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable key/value capability injected into the cache manager and the
/// orchestrator. Values are opaque JSON strings so one store instance can
/// hold cache entries and the recently-viewed ring alike.
pub trait PersistentStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Store backed by a single JSON file holding a string map. Survives process
/// restarts; writes rewrite the whole file under an internal lock. Cloning
/// shares the lock, so one path must not be opened through two separate
/// instances.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, map: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if parent != Path::new("") {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec(map)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await.unwrap_or_default();
        map.insert(key.to_string(), value);
        self.persist(&map).await
    }
}

#[cfg(test)]
pub(crate) mod doubles {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// In-memory stand-in for the persistent tier.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryStore {
        entries: Arc<StdMutex<HashMap<String, String>>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entry(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        pub fn insert(&self, key: &str, value: String) {
            self.entries.lock().unwrap().insert(key.to_string(), value);
        }
    }

    impl PersistentStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    /// Store whose every operation fails, for degraded-tier tests.
    #[derive(Debug, Clone, Default)]
    pub struct FailingStore;

    impl PersistentStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("store offline")))
        }

        async fn put(&self, _key: &str, _value: String) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("store offline")))
        }
    }
}
