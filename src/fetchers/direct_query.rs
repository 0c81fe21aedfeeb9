// Direct-query fetcher: builds a relational query incrementally against the
// backend's REST surface (PostgREST conventions). This is the fallback
// strategy; once the orchestrator reaches it, its result is trusted at face
// value. It also carries the operations only the relational backend offers:
// single-record detail lookups, the text-search id resolver RPC and the
// fire-and-forget view-count increment RPC.

use crate::error::{VehicleError, VehicleResult};
use crate::fetchers::{DetailSource, RawPage, RemoteFetcher, SearchResolver};
use crate::models::{RawRecord, SourceShape, VehicleFilters};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const INVENTORY_TABLE: &str = "inventory_cache";
const SEARCH_RPC: &str = "search_vehicles";
const VIEW_COUNT_RPC: &str = "increment_vehicle_views";

/// Every record the query stage returns must already be purchased stock;
/// this base filter is applied here, never at normalization.
const BASE_VISIBILITY_FILTER: (&str, &str) = ("purchase_status", "eq.Purchased");

pub struct DirectQueryFetcher<R: SearchResolver = RpcSearchResolver> {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
    resolver: R,
}

/// Text-search resolver backed by the backend's `search_vehicles` RPC.
pub struct RpcSearchResolver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SlugRow {
    slug: String,
}

fn auth_headers(api_key: &Option<String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        if let Ok(value) = HeaderValue::from_str(key) {
            headers.insert("apikey", value);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }
    }
    headers
}

impl RpcSearchResolver {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        RpcSearchResolver {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

impl SearchResolver for RpcSearchResolver {
    async fn resolve(&self, term: &str) -> VehicleResult<Vec<i64>> {
        let url = format!("{}/rpc/{SEARCH_RPC}", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(auth_headers(&self.api_key))
            .json(&json!({ "search_term": term }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleError::UpstreamStatus(status));
        }
        let hits: Vec<SearchHit> = response.json().await?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }
}

// PostgREST `in.(...)` lists quote string values; embedded quotes escape.
fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

fn int_list<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Maps the public ordering field names onto backend columns.
fn order_column(field: &str) -> &str {
    match field {
        "price" => "price",
        "year" => "year",
        "mileage" => "mileage",
        other => other,
    }
}

impl<R: SearchResolver> DirectQueryFetcher<R> {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        page_size: u32,
        resolver: R,
    ) -> Self {
        DirectQueryFetcher {
            client,
            base_url: base_url.into(),
            api_key,
            page_size,
            resolver,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/{INVENTORY_TABLE}", self.base_url)
    }

    /// Builds the full query parameter list: base visibility filter, equality
    /// facets, ranges, search-id constraint, ordering, then offset/limit.
    fn build_params(
        &self,
        filters: &VehicleFilters,
        search_ids: Option<&[i64]>,
        page: u32,
    ) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            (
                BASE_VISIBILITY_FILTER.0.to_string(),
                BASE_VISIBILITY_FILTER.1.to_string(),
            ),
        ];

        if filters.hide_reserved {
            params.push((
                "or".to_string(),
                "(is_reserved.is.false,is_reserved.is.null)".to_string(),
            ));
        }

        let mut facet = |column: &str, values: &[String]| {
            if !values.is_empty() {
                params.push((column.to_string(), format!("in.({})", quoted_list(values))));
            }
        };
        facet("make", &filters.make);
        facet("transmission", &filters.transmission);
        facet("fuel_type", &filters.fuel_type);
        facet("warranty", &filters.warranty);
        facet("body_type", &filters.body_type);
        facet("branch", &filters.branch);
        if !filters.year.is_empty() {
            params.push(("year".to_string(), format!("in.({})", int_list(&filters.year))));
        }
        if !filters.promotions.is_empty() {
            params.push((
                "promotions".to_string(),
                format!("ov.{{{}}}", filters.promotions.join(",")),
            ));
        }

        if let Some(min) = filters.min_price {
            params.push(("price".to_string(), format!("gte.{min}")));
        }
        if let Some(max) = filters.max_price {
            params.push(("price".to_string(), format!("lte.{max}")));
        }
        if let Some(min) = filters.min_down_payment {
            params.push(("min_down_payment".to_string(), format!("gte.{min}")));
        }
        if let Some(max) = filters.max_down_payment {
            params.push(("min_down_payment".to_string(), format!("lte.{max}")));
        }

        if let Some(ids) = search_ids {
            params.push(("id".to_string(), format!("in.({})", int_list(ids))));
        }

        match filters.order_by.as_deref() {
            Some("relevance") => {
                params.push(("order".to_string(), "view_count.desc".to_string()));
            }
            Some(pair) => {
                let (field, direction) = pair.split_once('-').unwrap_or((pair, "desc"));
                let direction = if direction == "asc" { "asc" } else { "desc" };
                params.push((
                    "order".to_string(),
                    format!("{}.{direction}", order_column(field)),
                ));
            }
            // The search RPC already ranked by relevance; only impose the
            // recency default when no search is active.
            None if filters.search.is_none() => {
                params.push(("order".to_string(), "updated_at.desc".to_string()));
            }
            None => {}
        }

        let offset = (page.max(1) - 1) * self.page_size;
        params.push(("offset".to_string(), offset.to_string()));
        params.push(("limit".to_string(), self.page_size.to_string()));
        params
    }

    async fn fetch_rows(&self, params: &[(String, String)]) -> VehicleResult<(Vec<Value>, Option<i64>)> {
        let mut headers = auth_headers(&self.api_key);
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self
            .client
            .get(self.table_url())
            .headers(headers)
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleError::UpstreamStatus(status));
        }

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let rows: Vec<Value> = response.json().await?;
        Ok((rows, total))
    }
}

/// `Content-Range: 0-20/97` → 97. The count segment may be `*` when the
/// backend declines to count.
fn parse_content_range_total(value: &str) -> Option<i64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

impl<R: SearchResolver> RemoteFetcher for DirectQueryFetcher<R> {
    fn name(&self) -> &'static str {
        "direct-query"
    }

    async fn fetch_page(&self, filters: &VehicleFilters, page: u32) -> VehicleResult<RawPage> {
        let search_ids = match filters.search.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(term) => {
                let ids = self.resolver.resolve(term.trim()).await?;
                if ids.is_empty() {
                    // An exhausted search must yield zero results, not the
                    // whole unfiltered set.
                    tracing::debug!(term, "search resolved to no ids");
                    return Ok(RawPage::empty());
                }
                Some(ids)
            }
            None => None,
        };

        let params = self.build_params(filters, search_ids.as_deref(), page);
        tracing::debug!(page, "querying relational backend");
        let (rows, total) = self.fetch_rows(&params).await?;

        let total_count = match total {
            Some(count) => count,
            None => {
                return Err(VehicleError::MalformedResponse(
                    "missing exact count in Content-Range".to_string(),
                ))
            }
        };
        Ok(RawPage {
            records: rows
                .into_iter()
                .map(|row| RawRecord::new(SourceShape::RelationalCache, row))
                .collect(),
            total_count,
        })
    }
}

impl<R: SearchResolver> DetailSource for DirectQueryFetcher<R> {
    async fn fetch_by_slug(&self, slug: &str) -> VehicleResult<Option<RawRecord>> {
        self.fetch_single(&[
            ("select".to_string(), "*".to_string()),
            ("slug".to_string(), format!("eq.{slug}")),
            ("limit".to_string(), "1".to_string()),
        ])
        .await
    }

    async fn fetch_by_purchase_order(&self, code: &str) -> VehicleResult<Option<RawRecord>> {
        self.fetch_single(&[
            ("select".to_string(), "*".to_string()),
            ("purchase_order_code".to_string(), format!("eq.{code}")),
            ("limit".to_string(), "1".to_string()),
        ])
        .await
    }

    async fn fetch_slugs(&self) -> VehicleResult<Vec<String>> {
        let params = [
            ("select".to_string(), "slug".to_string()),
            (
                BASE_VISIBILITY_FILTER.0.to_string(),
                BASE_VISIBILITY_FILTER.1.to_string(),
            ),
            ("order".to_string(), "updated_at.desc".to_string()),
        ];
        let response = self
            .client
            .get(self.table_url())
            .headers(auth_headers(&self.api_key))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleError::UpstreamStatus(status));
        }
        let rows: Vec<SlugRow> = response.json().await?;
        Ok(rows.into_iter().map(|row| row.slug).collect())
    }

    fn record_view(&self, purchase_order_code: String) {
        let client = self.client.clone();
        let url = format!("{}/rpc/{VIEW_COUNT_RPC}", self.base_url);
        let headers = auth_headers(&self.api_key);
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .headers(headers)
                .json(&json!({ "purchase_order": purchase_order_code.as_str() }))
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    tracing::error!(
                        code = %purchase_order_code,
                        status = %response.status(),
                        "view-count increment rejected"
                    );
                }
                Err(e) => {
                    tracing::error!(code = %purchase_order_code, error = %e, "view-count increment failed");
                }
                Ok(_) => {}
            }
        });
    }
}

impl<R: SearchResolver> DirectQueryFetcher<R> {
    async fn fetch_single(&self, params: &[(String, String)]) -> VehicleResult<Option<RawRecord>> {
        let response = self
            .client
            .get(self.table_url())
            .headers(auth_headers(&self.api_key))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleError::UpstreamStatus(status));
        }
        let mut rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawRecord::new(
            SourceShape::RelationalCache,
            rows.swap_remove(0),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubResolver {
        ids: Vec<i64>,
        calls: AtomicUsize,
    }

    impl StubResolver {
        fn returning(ids: Vec<i64>) -> Self {
            StubResolver {
                ids,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SearchResolver for StubResolver {
        async fn resolve(&self, _term: &str) -> VehicleResult<Vec<i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ids.clone())
        }
    }

    fn fetcher(resolver: StubResolver) -> DirectQueryFetcher<StubResolver> {
        // The base URL is never contacted by the param-building tests or the
        // empty-search short-circuit.
        DirectQueryFetcher::new(Client::new(), "http://backend.test/rest/v1", None, 21, resolver)
    }

    fn values_of<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn base_visibility_filter_is_always_applied() {
        let f = fetcher(StubResolver::returning(vec![]));
        let params = f.build_params(&VehicleFilters::default(), None, 1);
        assert_eq!(values_of(&params, "purchase_status"), vec!["eq.Purchased"]);
    }

    #[test]
    fn list_facets_build_quoted_in_lists() {
        let f = fetcher(StubResolver::returning(vec![]));
        let filters = VehicleFilters {
            make: vec!["Toyota".into(), "Alfa \"Romeo\"".into()],
            year: vec![2020, 2021],
            ..VehicleFilters::default()
        };
        let params = f.build_params(&filters, None, 1);
        assert_eq!(
            values_of(&params, "make"),
            vec![r#"in.("Toyota","Alfa \"Romeo\"")"#]
        );
        assert_eq!(values_of(&params, "year"), vec!["in.(2020,2021)"]);
    }

    #[test]
    fn range_filters_constrain_both_bounds() {
        let f = fetcher(StubResolver::returning(vec![]));
        let filters = VehicleFilters {
            min_price: Some(150_000.0),
            max_price: Some(400_000.0),
            min_down_payment: Some(20_000.0),
            max_down_payment: Some(60_000.0),
            ..VehicleFilters::default()
        };
        let params = f.build_params(&filters, None, 1);
        assert_eq!(values_of(&params, "price"), vec!["gte.150000", "lte.400000"]);
        assert_eq!(
            values_of(&params, "min_down_payment"),
            vec!["gte.20000", "lte.60000"]
        );
    }

    #[test]
    fn ordering_modes() {
        let f = fetcher(StubResolver::returning(vec![]));

        let relevance = VehicleFilters {
            order_by: Some("relevance".into()),
            ..VehicleFilters::default()
        };
        assert_eq!(
            values_of(&f.build_params(&relevance, None, 1), "order"),
            vec!["view_count.desc"]
        );

        let pair = VehicleFilters {
            order_by: Some("price-asc".into()),
            ..VehicleFilters::default()
        };
        assert_eq!(
            values_of(&f.build_params(&pair, None, 1), "order"),
            vec!["price.asc"]
        );

        // Default recency order only when neither order nor search is set.
        assert_eq!(
            values_of(&f.build_params(&VehicleFilters::default(), None, 1), "order"),
            vec!["updated_at.desc"]
        );
        let searching = VehicleFilters {
            search: Some("jetta".into()),
            ..VehicleFilters::default()
        };
        assert!(values_of(&f.build_params(&searching, Some(&[1, 2]), 1), "order").is_empty());
    }

    #[test]
    fn pagination_derives_offset_and_limit() {
        let f = fetcher(StubResolver::returning(vec![]));
        let params = f.build_params(&VehicleFilters::default(), None, 3);
        assert_eq!(values_of(&params, "offset"), vec!["42"]);
        assert_eq!(values_of(&params, "limit"), vec!["21"]);
    }

    #[test]
    fn search_ids_constrain_the_query() {
        let f = fetcher(StubResolver::returning(vec![]));
        let filters = VehicleFilters {
            search: Some("jetta".into()),
            ..VehicleFilters::default()
        };
        let params = f.build_params(&filters, Some(&[5, 9]), 1);
        assert_eq!(values_of(&params, "id"), vec!["in.(5,9)"]);
    }

    #[tokio::test]
    async fn empty_search_match_short_circuits_to_zero_results() {
        let f = fetcher(StubResolver::returning(vec![]));
        let filters = VehicleFilters {
            search: Some("nonexistent".into()),
            ..VehicleFilters::default()
        };
        let page = f.fetch_page(&filters, 1).await.expect("short circuit");
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, 0);
        assert_eq!(f.resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn content_range_total_parses() {
        assert_eq!(parse_content_range_total("0-20/97"), Some(97));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-20/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn hide_reserved_adds_null_tolerant_or_filter() {
        let f = fetcher(StubResolver::returning(vec![]));
        let filters = VehicleFilters {
            hide_reserved: true,
            ..VehicleFilters::default()
        };
        let params = f.build_params(&filters, None, 1);
        assert_eq!(
            values_of(&params, "or"),
            vec!["(is_reserved.is.false,is_reserved.is.null)"]
        );
    }
}
