//! Vehicle inventory data-access core: fetches, normalizes and caches
//! vehicle listings from heterogeneous, partially unreliable upstream
//! sources.
//!
//! Consumers call [`VehicleService`] only; fetcher selection, the two-tier
//! cache and record normalization are internal. The orchestration order is
//! fresh cache → fast index → direct relational query → stale cache, and the
//! stale path deliberately trades freshness for availability: old inventory
//! beats an error page.

// The fetcher and store traits are only ever used through generics inside
// this crate, never as trait objects.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod normalize;
pub mod service;
pub mod store;

pub use config::Settings;
pub use error::{StoreError, VehicleError, VehicleResult};
pub use models::{Vehicle, VehicleFilters, VehiclePage, VehicleSummary};
pub use service::{DefaultVehicleService, VehicleService};
