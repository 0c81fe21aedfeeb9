// Remote fetch strategies. Two independent implementations satisfy the same
// page contract; the orchestrator tries the fast index first and falls back
// to the direct relational query. Detail lookups, text search resolution and
// the view-count increment live on the direct backend only.

pub mod direct_query;
pub mod fast_index;

use crate::error::VehicleResult;
use crate::models::{RawRecord, VehicleFilters};

pub use direct_query::{DirectQueryFetcher, RpcSearchResolver};
pub use fast_index::FastIndexFetcher;

/// One page of raw upstream records plus the exact match count.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    pub total_count: i64,
}

impl RawPage {
    pub fn empty() -> Self {
        RawPage::default()
    }
}

/// A strategy that retrieves one page of raw records matching a filter set.
/// `page` is 1-indexed. Failure here is a transport/query error; recovery is
/// the orchestrator's business, not the fetcher's (no internal retries).
pub trait RemoteFetcher {
    fn name(&self) -> &'static str;

    async fn fetch_page(&self, filters: &VehicleFilters, page: u32) -> VehicleResult<RawPage>;
}

/// Resolves a free-text query to the set of matching record ids. The direct
/// fetcher constrains its query to these ids; an empty set forces an empty
/// result page rather than an unfiltered one.
pub trait SearchResolver {
    async fn resolve(&self, term: &str) -> VehicleResult<Vec<i64>>;
}

/// Single-record and auxiliary operations only the relational backend offers.
pub trait DetailSource {
    async fn fetch_by_slug(&self, slug: &str) -> VehicleResult<Option<RawRecord>>;

    async fn fetch_by_purchase_order(&self, code: &str) -> VehicleResult<Option<RawRecord>>;

    /// Slugs of all purchased vehicles, most recently updated first.
    async fn fetch_slugs(&self) -> VehicleResult<Vec<String>>;

    /// Fire-and-forget server-side view-count increment. Must return
    /// immediately; failure is logged by the implementation, never surfaced.
    fn record_view(&self, purchase_order_code: String);
}
