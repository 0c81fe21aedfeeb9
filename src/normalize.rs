// Record Normalizer: converts one raw record of any of the three upstream
// shapes into the canonical `Vehicle`. Field-level parse failures degrade to
// safe defaults; this module never fails and never panics on data.
//
// The three sources disagree on field spelling (canonical camelCase from the
// fast index, snake_case from the relational cache, legacy names from the CMS
// export) and on list encodings (native array, JSON-encoded string, comma
// string). Each canonical field is resolved through a fixed alias priority
// list; list-valued fields accept all three encodings.

use crate::models::{RawRecord, Vehicle};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const UNTITLED_VEHICLE: &str = "Untitled vehicle";

/// Fallback feature image when a record carries no usable URL and no
/// category-specific placeholder matches. Records in list results that end up
/// with exactly this image are dropped by `normalize_batch`.
pub const DEFAULT_PLACEHOLDER_IMAGE: &str =
    "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/sedan-2Artboard-12-trefa.png";

// Branch codes as stored upstream; unknown codes pass through unchanged.
static BRANCH_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("MTY", "Monterrey"),
        ("GPE", "Guadalupe"),
        ("TMPS", "Reynosa"),
        ("COAH", "Saltillo"),
    ])
});

// Keyed by lower-kebab body category.
static PLACEHOLDER_IMAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("suv", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/suv-2Artboard-12-trefa.png"),
        ("pick-up", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/pickup-2Artboard-12-trefa-1.png"),
        ("pickup", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/pickup-2Artboard-12-trefa-1.png"),
        ("sedan", DEFAULT_PLACEHOLDER_IMAGE),
        ("hatchback", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/hbArtboard-12-trefa.png"),
        ("moto", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/motos-placeholder.png"),
        ("motos", "https://jjepfehmuybpctdzipnu.supabase.co/storage/v1/object/public/fotos_airtable/app/motos-placeholder.png"),
    ])
});

/// Normalize a whole fetched page. Records that resolve to the bare default
/// placeholder image carry no photography at all and are dropped from list
/// results.
pub fn normalize_batch(records: &[RawRecord]) -> Vec<Vehicle> {
    records
        .iter()
        .map(normalize_record)
        .filter(|v| v.feature_image != DEFAULT_PLACEHOLDER_IMAGE)
        .collect()
}

/// Normalize one raw record. Always succeeds; a record that is not even a
/// JSON object yields the placeholder vehicle.
pub fn normalize_record(raw: &RawRecord) -> Vehicle {
    let Some(map) = raw.value.as_object() else {
        tracing::warn!(source = raw.source.as_str(), "raw record is not an object");
        return placeholder_vehicle();
    };

    let make = string_field(map, &["make", "brand"]);
    let model = string_field(map, &["model"]);
    let year = int_field(map, &["year", "model_year", "modelYear"]) as i32;

    let title = resolve_title(map, &make, &model, year);
    let slug = match string_field(map, &["slug"]) {
        s if s.is_empty() => slugify(&title),
        s => s,
    };

    let body_categories = list_field(map, &["bodyCategories", "body_categories", "categories"]);
    let body_type = first_scalar(field(map, &["bodyType", "body_type"]));

    let exterior_gallery = gallery_field(
        map,
        &["exteriorGallery", "exterior_gallery"],
        &["exteriorPhotoUrls", "exterior_photo_urls"],
    );
    let interior_gallery = gallery_field(
        map,
        &["interiorGallery", "interior_gallery"],
        &["interiorPhotoUrls", "interior_photo_urls"],
    );

    let feature_image = resolve_feature_image(
        map,
        &exterior_gallery,
        &interior_gallery,
        &body_categories,
        &body_type,
    );

    let view_count = int_field(map, &["viewCount", "view_count", "views"]);

    Vehicle {
        id: int_field(map, &["id", "recordId", "record_id"]),
        slug,
        purchase_order_code: string_field(
            map,
            &["purchaseOrderCode", "purchase_order_code", "order_code"],
        ),

        title,
        description: string_field(map, &["description", "post_content"]),
        meta_description: string_field(map, &["metaDescription", "meta_description"]),

        make,
        model,
        year,
        body_type,
        body_categories,

        price: float_field(map, &["price", "listPrice", "list_price"]),
        min_down_payment: float_field(map, &["minDownPayment", "min_down_payment"]),
        recommended_down_payment: float_field(
            map,
            &["recommendedDownPayment", "recommended_down_payment"],
        ),
        min_monthly_payment: float_field(map, &["minMonthlyPayment", "min_monthly_payment"]),
        recommended_monthly_payment: float_field(
            map,
            &["recommendedMonthlyPayment", "recommended_monthly_payment"],
        ),
        max_term_months: int_field(map, &["maxTermMonths", "max_term_months"]) as i32,

        mileage: int_field(map, &["mileage", "odometer", "kms"]),
        transmission: first_scalar(field(map, &["transmission"])),
        fuel_type: first_scalar(field(map, &["fuelType", "fuel_type", "fuel"])),
        cylinders: int_field(map, &["cylinders"]) as i32,

        feature_image,
        exterior_gallery,
        interior_gallery,

        branches: branch_names(&list_field(
            map,
            &["branches", "branch", "locations", "location"],
        )),

        is_reserved: bool_field(map, &["isReserved", "is_reserved", "reserved"]),
        is_sold: bool_field(map, &["isSold", "is_sold", "sold"]),
        purchase_status: string_field(
            map,
            &["purchaseStatus", "purchase_status", "orderStatus", "order_status"],
        ),

        view_count,
        promotions: list_field(map, &["promotions", "promos"]),

        warranty: first_scalar(field(map, &["warranty"])),
    }
}

fn placeholder_vehicle() -> Vehicle {
    Vehicle {
        title: UNTITLED_VEHICLE.to_string(),
        slug: slugify(UNTITLED_VEHICLE),
        feature_image: DEFAULT_PLACEHOLDER_IMAGE.to_string(),
        ..Vehicle::default()
    }
}

/// First present, non-null value among the aliases.
fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// First non-empty string among the aliases, trimmed.
fn string_field(map: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(Value::String(s)) = map.get(*key) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

/// Lenient float: native number, or string with thousands separators
/// stripped, or first element of a list. Invalid input maps to 0, never NaN.
fn float_field(map: &Map<String, Value>, keys: &[&str]) -> f64 {
    lenient_f64(field(map, keys)).unwrap_or(0.0)
}

fn int_field(map: &Map<String, Value>, keys: &[&str]) -> i64 {
    lenient_i64(field(map, keys)).unwrap_or(0)
}

fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let value = flatten_single(value)?;
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn lenient_i64(value: Option<&Value>) -> Option<i64> {
    let value = flatten_single(value)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Upstream sometimes wraps a scalar in a one-element list, or JSON-encodes
/// that list into a string. Unwrap to the first element.
fn flatten_single(value: Option<&Value>) -> Option<Value> {
    let value = value?;
    match value {
        Value::Array(items) => items.first().cloned(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
                    return items.into_iter().next();
                }
            }
            Some(value.clone())
        }
        _ => Some(value.clone()),
    }
}

/// Scalar string fields (transmission, fuel type, body type) that may arrive
/// as a single value, a one-element list, or a JSON-encoded list.
fn first_scalar(value: Option<&Value>) -> String {
    match flatten_single(value) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Triple-encoding list decode: native array, JSON-encoded string, or
/// comma-separated string all yield the same trimmed, deduplicated,
/// order-preserving list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let items = match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Array(items)) => {
                        items.iter().filter_map(scalar_to_string).collect()
                    }
                    _ => split_commas(trimmed),
                }
            } else {
                split_commas(trimmed)
            }
        }
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    };
    dedup_preserving_order(items)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_commas(s: &str) -> Vec<String> {
    s.split(',').map(|part| part.trim().to_string()).collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn list_field(map: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    string_list(field(map, keys))
}

/// Kept only if, after trimming, the value is non-empty and starts with
/// `http`. Rejects relative paths, placeholders and `#ERROR!` sentinels.
fn is_image_url(url: &str) -> bool {
    let trimmed = url.trim();
    !trimmed.is_empty() && trimmed.starts_with("http")
}

/// Galleries arrive under two historical field names per side; both are
/// decoded, concatenated in order, URL-filtered and deduplicated.
fn gallery_field(
    map: &Map<String, Value>,
    primary_keys: &[&str],
    legacy_keys: &[&str],
) -> Vec<String> {
    let mut urls = string_list(field(map, primary_keys));
    urls.extend(string_list(field(map, legacy_keys)));
    dedup_preserving_order(urls.into_iter().filter(|u| is_image_url(u)).collect())
}

fn bool_field(map: &Map<String, Value>, keys: &[&str]) -> bool {
    match field(map, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn resolve_title(map: &Map<String, Value>, make: &str, model: &str, year: i32) -> String {
    let explicit = string_field(map, &["title", "post_title"]);
    if !explicit.is_empty() {
        return explicit;
    }
    let year_part = if year > 0 { year.to_string() } else { String::new() };
    let composed = [make, model, year_part.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    if composed.is_empty() {
        UNTITLED_VEHICLE.to_string()
    } else {
        composed
    }
}

// Candidate order is a hard contract: explicit feature image, its URL
// variant, WebP thumbnail, plain thumbnail, WebP feature variant, then the
// first gallery URL, then a category placeholder.
fn resolve_feature_image(
    map: &Map<String, Value>,
    exterior_gallery: &[String],
    interior_gallery: &[String],
    body_categories: &[String],
    body_type: &str,
) -> String {
    const CANDIDATE_KEYS: [&str; 6] = [
        "featureImage",
        "feature_image",
        "feature_image_url",
        "thumbnail_webp",
        "thumbnail",
        "feature_image_webp",
    ];
    for key in CANDIDATE_KEYS {
        let candidate = first_scalar(map.get(key));
        if !candidate.is_empty() && candidate != "#ERROR!" {
            return candidate;
        }
    }
    if let Some(url) = exterior_gallery.first() {
        return url.clone();
    }
    if let Some(url) = interior_gallery.first() {
        return url.clone();
    }
    placeholder_for(body_categories, body_type)
}

/// Body categories are lower-kebab-cased when used as lookup keys; the stored
/// values keep their original casing.
fn lookup_key(category: &str) -> String {
    category.trim().to_lowercase().replace(' ', "-")
}

fn placeholder_for(body_categories: &[String], body_type: &str) -> String {
    for category in body_categories {
        if let Some(url) = PLACEHOLDER_IMAGES.get(lookup_key(category).as_str()) {
            return (*url).to_string();
        }
    }
    if let Some(url) = PLACEHOLDER_IMAGES.get(lookup_key(body_type).as_str()) {
        return (*url).to_string();
    }
    DEFAULT_PLACEHOLDER_IMAGE.to_string()
}

/// Raw branch codes translate through the fixed table; unknown codes pass
/// through unchanged.
fn branch_names(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|code| {
            let upper = code.trim().to_uppercase();
            match BRANCH_NAMES.get(upper.as_str()) {
                Some(name) => (*name).to_string(),
                None => code.trim().to_string(),
            }
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// URL-safe slug derived from the title: lowercased, accents folded,
/// non-alphanumeric runs collapsed to single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_hyphen = true; // suppress leading hyphen
    for c in text.chars().map(fold_accent) {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// Latin accent folding for the characters that actually occur in the
// inventory data.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => 'a',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'u',
        'ñ' | 'Ñ' => 'n',
        other => other,
    }
}
