// Fast-path fetcher: one GET against the precomputed index endpoint. List
// facets are serialized as repeated query keys, everything else as scalars;
// `page` and `pageSize` are always present. Any non-2xx response is a hard
// failure for this strategy and triggers the orchestrator's fallback. No
// retries here.

use crate::error::{VehicleError, VehicleResult};
use crate::fetchers::{RawPage, RemoteFetcher};
use crate::models::{RawRecord, SourceShape, VehicleFilters};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: u32 = 21;

pub struct FastIndexFetcher {
    client: Client,
    url: String,
    page_size: u32,
}

// Both fields are contractual. A 2xx body missing either (an upstream error
// payload, say) must fail decoding rather than read as an empty page, so the
// orchestrator still falls through to the next fetcher.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FastIndexResponse {
    vehicles: Vec<Value>,
    total_count: i64,
}

impl FastIndexFetcher {
    pub fn new(client: Client, url: impl Into<String>, page_size: u32) -> Self {
        FastIndexFetcher {
            client,
            url: url.into(),
            page_size,
        }
    }

    fn query_params(&self, filters: &VehicleFilters, page: u32) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();

        let mut repeated = |key: &str, values: &[String]| {
            for value in values {
                params.push((key.to_string(), value.clone()));
            }
        };
        repeated("make", &filters.make);
        repeated("transmission", &filters.transmission);
        repeated("fuelType", &filters.fuel_type);
        repeated("warranty", &filters.warranty);
        repeated("bodyType", &filters.body_type);
        repeated("branch", &filters.branch);
        repeated("promotions", &filters.promotions);
        for year in &filters.year {
            params.push(("year".to_string(), year.to_string()));
        }

        if let Some(min) = filters.min_price {
            params.push(("minPrice".to_string(), min.to_string()));
        }
        if let Some(max) = filters.max_price {
            params.push(("maxPrice".to_string(), max.to_string()));
        }
        if let Some(min) = filters.min_down_payment {
            params.push(("minDownPayment".to_string(), min.to_string()));
        }
        if let Some(max) = filters.max_down_payment {
            params.push(("maxDownPayment".to_string(), max.to_string()));
        }
        if filters.hide_reserved {
            params.push(("hideReserved".to_string(), "true".to_string()));
        }
        if let Some(search) = filters.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search".to_string(), search.trim().to_string()));
        }
        if let Some(order) = &filters.order_by {
            params.push(("orderby".to_string(), order.clone()));
        }

        params.push(("page".to_string(), page.to_string()));
        params.push(("pageSize".to_string(), self.page_size.to_string()));
        params
    }
}

impl RemoteFetcher for FastIndexFetcher {
    fn name(&self) -> &'static str {
        "fast-index"
    }

    async fn fetch_page(&self, filters: &VehicleFilters, page: u32) -> VehicleResult<RawPage> {
        let params = self.query_params(filters, page);
        tracing::debug!(url = %self.url, page, "querying fast index");

        let response = self.client.get(&self.url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleError::UpstreamStatus(status));
        }

        let body: FastIndexResponse = response.json().await?;
        tracing::debug!(
            page,
            records = body.vehicles.len(),
            total = body.total_count,
            "fast index responded"
        );
        Ok(RawPage {
            records: body
                .vehicles
                .into_iter()
                .map(|v| RawRecord::new(SourceShape::FastIndex, v))
                .collect(),
            total_count: body.total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> FastIndexFetcher {
        FastIndexFetcher::new(Client::new(), "http://index.test/vehicles", DEFAULT_PAGE_SIZE)
    }

    fn value_of<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn list_facets_serialize_as_repeated_keys() {
        let filters = VehicleFilters {
            make: vec!["Toyota".into(), "Honda".into()],
            year: vec![2020, 2021],
            ..VehicleFilters::default()
        };
        let params = fetcher().query_params(&filters, 1);
        assert_eq!(value_of(&params, "make"), vec!["Toyota", "Honda"]);
        assert_eq!(value_of(&params, "year"), vec!["2020", "2021"]);
    }

    #[test]
    fn page_and_page_size_are_always_present() {
        let params = fetcher().query_params(&VehicleFilters::default(), 3);
        assert_eq!(value_of(&params, "page"), vec!["3"]);
        assert_eq!(value_of(&params, "pageSize"), vec!["21"]);
    }

    #[test]
    fn scalar_filters_serialize_once() {
        let filters = VehicleFilters {
            min_price: Some(100_000.0),
            max_price: Some(350_000.0),
            hide_reserved: true,
            search: Some("  jetta  ".into()),
            order_by: Some("price-asc".into()),
            ..VehicleFilters::default()
        };
        let params = fetcher().query_params(&filters, 1);
        assert_eq!(value_of(&params, "minPrice"), vec!["100000"]);
        assert_eq!(value_of(&params, "maxPrice"), vec!["350000"]);
        assert_eq!(value_of(&params, "hideReserved"), vec!["true"]);
        assert_eq!(value_of(&params, "search"), vec!["jetta"]);
        assert_eq!(value_of(&params, "orderby"), vec!["price-asc"]);
    }

    #[test]
    fn contract_violating_body_fails_to_decode() {
        // An upstream error payload must not read as an empty result page.
        assert!(serde_json::from_str::<FastIndexResponse>(r#"{"error":"quota exceeded"}"#).is_err());
        assert!(serde_json::from_str::<FastIndexResponse>(r#"{"vehicles":[]}"#).is_err());

        let page = serde_json::from_str::<FastIndexResponse>(r#"{"vehicles":[],"totalCount":0}"#)
            .expect("a genuinely empty page decodes");
        assert!(page.vehicles.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn blank_search_is_omitted() {
        let filters = VehicleFilters {
            search: Some("   ".into()),
            ..VehicleFilters::default()
        };
        let params = fetcher().query_params(&filters, 1);
        assert!(value_of(&params, "search").is_empty());
    }
}
