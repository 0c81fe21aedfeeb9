// Query Orchestrator: the one public entry point consumers call. Composes
// cache, fetchers and normalizer in a strict short-circuiting order:
// fresh cache → fast index → direct query → stale cache → propagate the last
// transport error.
//
// Concurrent identical calls are not deduplicated; two in-flight fetches for
// the same key will both hit upstream and the later write wins.

use crate::cache::{cache_key, CacheManager};
use crate::config::Settings;
use crate::error::VehicleResult;
use crate::fetchers::{
    DetailSource, DirectQueryFetcher, FastIndexFetcher, RemoteFetcher, RpcSearchResolver,
};
use crate::models::{Vehicle, VehicleFilters, VehiclePage, VehicleSummary};
use crate::normalize::{normalize_batch, normalize_record};
use crate::store::{JsonFileStore, PersistentStore};
use reqwest::Client;

const RECENTLY_VIEWED_KEY: &str = "trefa_recently_viewed";
const RECENTLY_VIEWED_LIMIT: usize = 10;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

pub struct VehicleService<P, F, S>
where
    S: PersistentStore,
{
    primary: P,
    fallback: F,
    cache: CacheManager<S>,
    store: Option<S>,
}

/// The production wiring: fast index in front of the relational backend,
/// JSON-file persistent tier.
pub type DefaultVehicleService =
    VehicleService<FastIndexFetcher, DirectQueryFetcher, JsonFileStore>;

impl DefaultVehicleService {
    pub fn from_settings(settings: &Settings) -> VehicleResult<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        let primary = FastIndexFetcher::new(
            client.clone(),
            settings.fast_index_url.clone(),
            settings.page_size,
        );
        let resolver = RpcSearchResolver::new(
            client.clone(),
            settings.backend_url.clone(),
            settings.backend_api_key.clone(),
        );
        let fallback = DirectQueryFetcher::new(
            client,
            settings.backend_url.clone(),
            settings.backend_api_key.clone(),
            settings.page_size,
            resolver,
        );
        let store = settings.cache_file.as_ref().map(JsonFileStore::new);

        Ok(VehicleService::new(
            primary,
            fallback,
            settings.cache_ttl_secs,
            store,
        ))
    }
}

impl<P, F, S> VehicleService<P, F, S>
where
    P: RemoteFetcher,
    F: RemoteFetcher,
    S: PersistentStore + Clone,
{
    pub fn new(primary: P, fallback: F, cache_ttl_secs: u64, store: Option<S>) -> Self {
        VehicleService {
            primary,
            fallback,
            cache: CacheManager::new(cache_ttl_secs, store.clone()),
            store,
        }
    }

    /// Fetch one filtered page. Never fails for cache-exhaustion reasons
    /// alone; the only error callers see is the underlying transport error
    /// when both fetchers fail and no cache entry of any freshness exists.
    pub async fn fetch_vehicles(
        &self,
        filters: &VehicleFilters,
        page: u32,
    ) -> VehicleResult<VehiclePage> {
        let key = cache_key(filters, page);

        if let Some(entry) = self.cache.get_fresh(&key).await {
            return Ok(entry.into());
        }

        match self.primary.fetch_page(filters, page).await {
            Ok(raw) => return Ok(self.complete_fetch(&key, raw).await),
            Err(e) => {
                tracing::warn!(
                    fetcher = self.primary.name(),
                    error = %e,
                    "primary fetch failed, falling back"
                );
            }
        }

        match self.fallback.fetch_page(filters, page).await {
            Ok(raw) => Ok(self.complete_fetch(&key, raw).await),
            Err(e) => {
                tracing::warn!(fetcher = self.fallback.name(), error = %e, "fallback fetch failed");
                if let Some(entry) = self.cache.get_any(&key).await {
                    tracing::warn!(key, "all fetchers failed, serving stale cache entry");
                    return Ok(entry.into());
                }
                Err(e)
            }
        }
    }

    async fn complete_fetch(&self, key: &str, raw: crate::fetchers::RawPage) -> VehiclePage {
        let vehicles = normalize_batch(&raw.records);
        self.cache
            .insert(key, vehicles.clone(), raw.total_count)
            .await;
        VehiclePage {
            vehicles,
            total_count: raw.total_count,
        }
    }

    /// The recently-viewed ring, newest first. Empty when the persistent
    /// store is absent or unreadable.
    pub async fn recently_viewed(&self) -> Vec<VehicleSummary> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.get(RECENTLY_VIEWED_KEY).await {
            Ok(Some(serialized)) => serde_json::from_str(&serialized).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read recently-viewed list");
                Vec::new()
            }
        }
    }

    async fn push_recently_viewed(&self, vehicle: &Vehicle) {
        let Some(store) = &self.store else { return };
        let mut recent = self.recently_viewed().await;
        recent.retain(|summary| summary.id != vehicle.id);
        recent.insert(0, VehicleSummary::from(vehicle));
        recent.truncate(RECENTLY_VIEWED_LIMIT);

        match serde_json::to_string(&recent) {
            Ok(serialized) => {
                if let Err(e) = store.put(RECENTLY_VIEWED_KEY, serialized).await {
                    tracing::warn!(error = %e, "could not persist recently-viewed list");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not serialize recently-viewed list"),
        }
    }
}

impl<P, F, S> VehicleService<P, F, S>
where
    P: RemoteFetcher,
    F: RemoteFetcher + DetailSource,
    S: PersistentStore + Clone,
{
    /// Detail lookup by slug. Failures are logged and collapse to `None`;
    /// a detail page renders its own not-found state either way.
    pub async fn vehicle_by_slug(&self, slug: &str) -> Option<Vehicle> {
        if slug.is_empty() {
            return None;
        }
        match self.fallback.fetch_by_slug(slug).await {
            Ok(Some(raw)) => Some(self.record_view(normalize_record(&raw)).await),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(slug, error = %e, "detail fetch by slug failed");
                None
            }
        }
    }

    pub async fn vehicle_by_purchase_order(&self, code: &str) -> Option<Vehicle> {
        if code.is_empty() {
            return None;
        }
        match self.fallback.fetch_by_purchase_order(code).await {
            Ok(Some(raw)) => Some(self.record_view(normalize_record(&raw)).await),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(code, error = %e, "detail fetch by purchase order failed");
                None
            }
        }
    }

    /// Slugs of every purchased vehicle, for sitemap generation. Collapses
    /// to an empty list on failure.
    pub async fn all_slugs(&self) -> Vec<String> {
        match self.fallback.fetch_slugs().await {
            Ok(slugs) => slugs,
            Err(e) => {
                tracing::error!(error = %e, "slug listing failed");
                Vec::new()
            }
        }
    }

    /// The authoritative increment is fire-and-forget against the backend;
    /// the returned copy is bumped optimistically for immediate display.
    async fn record_view(&self, mut vehicle: Vehicle) -> Vehicle {
        if !vehicle.purchase_order_code.is_empty() {
            self.fallback
                .record_view(vehicle.purchase_order_code.clone());
        }
        self.push_recently_viewed(&vehicle).await;
        vehicle.view_count += 1;
        vehicle
    }
}
