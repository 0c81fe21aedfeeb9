// Canonical data shapes shared across the fetch, cache and normalization
// layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single normalized vehicle shape every caller consumes. Raw upstream
/// records (any of the three source shapes) are converted into this by the
/// normalizer and never leave the crate in any other form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vehicle {
    pub id: i64,
    pub slug: String,
    pub purchase_order_code: String,

    pub title: String,
    pub description: String,
    pub meta_description: String,

    pub make: String,
    pub model: String,
    pub year: i32,
    pub body_type: String,
    pub body_categories: Vec<String>,

    pub price: f64,
    pub min_down_payment: f64,
    pub recommended_down_payment: f64,
    pub min_monthly_payment: f64,
    pub recommended_monthly_payment: f64,
    pub max_term_months: i32,

    pub mileage: i64,
    pub transmission: String,
    pub fuel_type: String,
    pub cylinders: i32,

    pub feature_image: String,
    pub exterior_gallery: Vec<String>,
    pub interior_gallery: Vec<String>,

    pub branches: Vec<String>,

    pub is_reserved: bool,
    pub is_sold: bool,
    pub purchase_status: String,

    pub view_count: i64,
    pub promotions: Vec<String>,

    pub warranty: String,
}

/// The one query shape this core answers: a filtered, paginated list.
/// List-valued facets are OR-ed within a field and AND-ed across fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleFilters {
    pub make: Vec<String>,
    pub year: Vec<i32>,
    pub transmission: Vec<String>,
    pub fuel_type: Vec<String>,
    pub warranty: Vec<String>,
    pub body_type: Vec<String>,
    pub branch: Vec<String>,
    pub promotions: Vec<String>,

    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_down_payment: Option<f64>,
    pub max_down_payment: Option<f64>,

    pub hide_reserved: bool,
    pub search: Option<String>,
    /// "relevance", "field-asc"/"field-desc", or unset for the default order.
    pub order_by: Option<String>,
}

impl VehicleFilters {
    /// Copy with all list facets sorted. Cache keys are built from this so
    /// that logically identical filter sets hit the same entry regardless of
    /// array element order.
    pub(crate) fn order_normalized(&self) -> Self {
        let mut canon = self.clone();
        canon.make.sort();
        canon.year.sort_unstable();
        canon.transmission.sort();
        canon.fuel_type.sort();
        canon.warranty.sort();
        canon.body_type.sort();
        canon.branch.sort();
        canon.promotions.sort();
        canon
    }
}

/// One page of normalized results, the orchestrator's return shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePage {
    pub vehicles: Vec<Vehicle>,
    pub total_count: i64,
}

/// A cache entry as held by either tier. Superseded whole on write, never
/// merged or partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Vec<Vehicle>,
    pub total_count: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<CacheEntry> for VehiclePage {
    fn from(entry: CacheEntry) -> Self {
        VehiclePage {
            vehicles: entry.data,
            total_count: entry.total_count,
        }
    }
}

/// Which upstream export a raw record came from. The three sources disagree
/// on field spelling and list encodings; the normalizer resolves both, the
/// tag survives for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// REST content-management export.
    Cms,
    /// Precomputed fast-index export.
    FastIndex,
    /// Relational-cache export.
    RelationalCache,
}

impl SourceShape {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceShape::Cms => "cms",
            SourceShape::FastIndex => "fast-index",
            SourceShape::RelationalCache => "relational-cache",
        }
    }
}

/// One raw upstream record, untyped until normalization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source: SourceShape,
    pub value: Value,
}

impl RawRecord {
    pub fn new(source: SourceShape, value: Value) -> Self {
        RawRecord { source, value }
    }
}

/// Trimmed-down record kept in the recently-viewed ring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleSummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub price: f64,
    pub feature_image: String,
    pub mileage: i64,
    pub year: i32,
}

impl From<&Vehicle> for VehicleSummary {
    fn from(v: &Vehicle) -> Self {
        VehicleSummary {
            id: v.id,
            slug: v.slug.clone(),
            title: v.title.clone(),
            price: v.price,
            feature_image: v.feature_image.clone(),
            mileage: v.mileage,
            year: v.year,
        }
    }
}
