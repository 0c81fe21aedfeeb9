// Two-tier cache: process-memory map in front of an optional persistent
// store. Read order is memory then store; writes go through to both.
// Freshness is TTL from write time, but entries are never evicted on expiry:
// the stale-read path (`get_any`) deliberately ignores TTL so that total
// upstream failure can still be answered with old data.

use crate::models::{CacheEntry, Vehicle, VehicleFilters};
use crate::store::PersistentStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Bumped whenever the canonical `Vehicle` shape changes incompatibly;
/// persisted entries with another version read as misses.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Wire form of a persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    version: u32,
    data: Vec<Vehicle>,
    total_count: i64,
    timestamp: DateTime<Utc>,
}

/// Deterministic cache key for `(filters, page)`. List facets are sorted
/// first, so logically identical filter sets share one entry regardless of
/// array element order.
pub fn cache_key(filters: &VehicleFilters, page: u32) -> String {
    let canon = filters.order_normalized();
    // Serializing a plain owned struct cannot fail.
    let serialized = serde_json::to_string(&canon).unwrap_or_default();
    format!("vehicles:{serialized}:{page}")
}

pub struct CacheManager<S: PersistentStore> {
    ttl: Duration,
    memory: Mutex<HashMap<String, CacheEntry>>,
    store: Option<S>,
}

impl<S: PersistentStore> CacheManager<S> {
    pub fn new(ttl_secs: u64, store: Option<S>) -> Self {
        CacheManager {
            ttl: Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            memory: Mutex::new(HashMap::new()),
            store,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        Utc::now() - entry.timestamp < self.ttl
    }

    /// Fresh read: memory tier, then persistent tier. A persistent hit
    /// repopulates the memory tier.
    pub async fn get_fresh(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory_entry(key) {
            if self.is_fresh(&entry) {
                tracing::debug!(key, "memory cache hit");
                return Some(entry);
            }
        }

        let entry = self.store_entry(key).await?;
        if !self.is_fresh(&entry) {
            return None;
        }
        tracing::debug!(key, "persistent cache hit");
        self.memory
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), entry.clone());
        Some(entry)
    }

    /// Stale-tolerant read, ignoring TTL. Used only after every remote
    /// fetcher has failed; whatever is found, however old, is returned.
    pub async fn get_any(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory_entry(key) {
            return Some(entry);
        }
        self.store_entry(key).await
    }

    /// Write-through: unconditionally supersedes both tiers with a fresh
    /// timestamp. Persistent-tier failures are logged, never propagated.
    pub async fn insert(&self, key: &str, data: Vec<Vehicle>, total_count: i64) {
        let entry = CacheEntry {
            data,
            total_count,
            timestamp: Utc::now(),
        };
        self.memory
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), entry.clone());

        let Some(store) = &self.store else { return };
        let persisted = PersistedEntry {
            version: CACHE_SCHEMA_VERSION,
            data: entry.data,
            total_count: entry.total_count,
            timestamp: entry.timestamp,
        };
        match serde_json::to_string(&persisted) {
            Ok(serialized) => {
                if let Err(e) = store.put(key, serialized).await {
                    tracing::warn!(key, error = %e, "could not write persistent cache tier");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "could not serialize cache entry"),
        }
    }

    fn memory_entry(&self, key: &str) -> Option<CacheEntry> {
        self.memory
            .lock()
            .expect("cache mutex poisoned")
            .get(key)
            .cloned()
    }

    async fn store_entry(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        let serialized = match store.get(key).await {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(key, error = %e, "could not read persistent cache tier");
                return None;
            }
        };
        match serde_json::from_str::<PersistedEntry>(&serialized) {
            Ok(persisted) if persisted.version == CACHE_SCHEMA_VERSION => Some(CacheEntry {
                data: persisted.data,
                total_count: persisted.total_count,
                timestamp: persisted.timestamp,
            }),
            Ok(persisted) => {
                tracing::debug!(
                    key,
                    found = persisted.version,
                    expected = CACHE_SCHEMA_VERSION,
                    "persisted entry has a different schema version, treating as miss"
                );
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "could not decode persisted cache entry");
                None
            }
        }
    }

    /// Plant an entry with a chosen timestamp directly in the memory tier.
    #[cfg(test)]
    pub(crate) fn seed_memory(&self, key: &str, entry: CacheEntry) {
        self.memory
            .lock()
            .expect("cache mutex poisoned")
            .insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::doubles::{FailingStore, MemoryStore};
    use serde_json::json;

    fn vehicle(id: i64) -> Vehicle {
        Vehicle {
            id,
            title: format!("Vehicle {id}"),
            ..Vehicle::default()
        }
    }

    fn stale_entry(data: Vec<Vehicle>, age_secs: i64) -> CacheEntry {
        CacheEntry {
            data,
            total_count: 1,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn fresh_write_then_read_hits_memory() {
        let cache: CacheManager<MemoryStore> = CacheManager::new(300, None);
        cache.insert("k", vec![vehicle(1)], 1).await;
        let hit = cache.get_fresh("k").await.expect("fresh hit");
        assert_eq!(hit.data[0].id, 1);
        assert_eq!(hit.total_count, 1);
    }

    #[tokio::test]
    async fn expired_entry_misses_fresh_but_serves_stale() {
        let cache: CacheManager<MemoryStore> = CacheManager::new(300, None);
        cache.seed_memory("k", stale_entry(vec![vehicle(7)], 3600));

        assert!(cache.get_fresh("k").await.is_none());
        let stale = cache.get_any("k").await.expect("stale hit");
        assert_eq!(stale.data[0].id, 7);
    }

    #[tokio::test]
    async fn persistent_hit_repopulates_memory() {
        let store = MemoryStore::new();
        let writer = CacheManager::new(300, Some(store.clone()));
        writer.insert("k", vec![vehicle(3)], 1).await;

        // New manager, empty memory tier, same store.
        let reader = CacheManager::new(300, Some(store));
        let hit = reader.get_fresh("k").await.expect("store hit");
        assert_eq!(hit.data[0].id, 3);
        // Second read must come from memory without touching the store.
        assert!(reader.memory_entry("k").is_some());
    }

    #[tokio::test]
    async fn schema_version_mismatch_reads_as_miss() {
        let store = MemoryStore::new();
        store.insert(
            "k",
            json!({
                "version": CACHE_SCHEMA_VERSION + 1,
                "data": [],
                "totalCount": 0,
                "timestamp": Utc::now(),
            })
            .to_string(),
        );
        let cache = CacheManager::new(300, Some(store));
        assert!(cache.get_fresh("k").await.is_none());
        assert!(cache.get_any("k").await.is_none());
    }

    #[tokio::test]
    async fn failing_store_degrades_silently() {
        let cache = CacheManager::new(300, Some(FailingStore));
        cache.insert("k", vec![vehicle(9)], 1).await;
        // Memory tier keeps working despite the store failing every call.
        assert_eq!(cache.get_fresh("k").await.expect("memory hit").data[0].id, 9);
    }

    #[test]
    fn cache_key_is_order_normalized() {
        let a = VehicleFilters {
            make: vec!["Toyota".into(), "Honda".into()],
            year: vec![2021, 2019],
            ..VehicleFilters::default()
        };
        let b = VehicleFilters {
            make: vec!["Honda".into(), "Toyota".into()],
            year: vec![2019, 2021],
            ..VehicleFilters::default()
        };
        assert_eq!(cache_key(&a, 1), cache_key(&b, 1));
        assert_ne!(cache_key(&a, 1), cache_key(&a, 2));
    }
}
