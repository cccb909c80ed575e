//! Secondary nutrition API client (Open Food Facts).
//!
//! Token-less and strictly a fallback: no retry policy beyond surfacing HTTP
//! errors. The product endpoint reports "not found" as `status: 0` inside a
//! 200 response, which is mapped to `Ok(None)` rather than treated as either
//! an error or a hit.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tokio::time::timeout;

use crate::clients::FoodApiClient;
use crate::config::FallbackConfig;
use crate::error::ResolveError;
use crate::model::{Product, Source};
use crate::normalize;

const SOURCE_NAME: &str = "Open Food Facts";

/// A product in Open Food Facts' native schema.
#[derive(Debug, Clone, Deserialize)]
pub struct OffProduct {
    pub code: Option<String>,
    pub product_name: Option<String>,
    pub brands: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub nutriments: OffNutriments,
}

/// Per-100g nutriment values. Some entries come back as strings, so every
/// field parses leniently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OffNutriments {
    #[serde(rename = "energy-kcal_100g", default, deserialize_with = "lenient_f64")]
    pub energy_kcal_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub proteins_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fat_100g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbohydrates_100g: Option<f64>,
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    product: Option<OffProduct>,
}

/// Client for the unauthenticated secondary nutrition API.
pub struct OpenFoodFactsClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl OpenFoodFactsClient {
    pub fn new(config: &FallbackConfig) -> Result<Self, ResolveError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self {
            // the client-level timeout backstops the per-request wrapper
            http: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.clone(),
            timeout,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    // The timeout covers the whole exchange, body included. An upstream that
    // answers with headers and then stalls the body must still fail fast.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ResolveError> {
        let request = async {
            let response = self.http.get(url).query(params).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ResolveError::UpstreamStatus {
                    upstream: SOURCE_NAME,
                    status,
                });
            }
            Ok(response.json().await?)
        };

        timeout(self.timeout, request)
            .await
            .map_err(|_| ResolveError::Timeout {
                upstream: SOURCE_NAME,
                timeout: self.timeout,
            })?
    }
}

#[async_trait]
impl FoodApiClient for OpenFoodFactsClient {
    fn source(&self) -> Source {
        Source::OpenFoodFacts
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        page: u32,
    ) -> Result<Vec<Product>, ResolveError> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Ok(Vec::new());
        }

        let url = format!("{}/cgi/search.pl", self.base_url);
        let page_size = max_results.to_string();
        let page = (page + 1).to_string();
        let response: SearchResponse = self
            .get_json(
                &url,
                &[
                    ("search_terms", query),
                    ("search_simple", "1"),
                    ("action", "process"),
                    ("json", "1"),
                    ("page_size", &page_size),
                    ("page", &page),
                ],
            )
            .await?;

        Ok(response
            .products
            .iter()
            .filter_map(|raw| match normalize::off_product_to_product(raw) {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(
                        "skipping unnormalizable search result {:?}: {e}",
                        raw.product_name
                    );
                    None
                }
            })
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Product>, ResolveError> {
        // Open Food Facts identifies products by barcode, so an id lookup is
        // the same endpoint as a barcode lookup
        self.find_by_barcode(id).await
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, ResolveError> {
        let url = format!("{}/api/v2/product/{}.json", self.base_url, barcode);
        let response: ProductResponse = match self.get_json(&url, &[]).await {
            Ok(response) => response,
            // the v2 endpoint answers 404 for unknown codes
            Err(ResolveError::UpstreamStatus { status, .. })
                if status == reqwest::StatusCode::NOT_FOUND =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        // status 0 (or a missing payload) is a first-class "not found"
        if response.status != 1 {
            return Ok(None);
        }
        let Some(mut raw) = response.product else {
            return Ok(None);
        };
        if raw.code.is_none() {
            raw.code = Some(barcode.to_string());
        }

        Ok(Some(normalize::off_product_to_product(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::io::Write;

    fn client(server: &Server) -> OpenFoodFactsClient {
        OpenFoodFactsClient::with_base_url(server.url(), Duration::from_millis(5000))
    }

    #[tokio::test]
    async fn search_normalizes_products() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/cgi/search.pl")
            .match_query(Matcher::UrlEncoded(
                "search_terms".to_string(),
                "cola".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"products": [{
                    "code": "5449000000996",
                    "product_name": "Coca-Cola",
                    "brands": "Coca-Cola",
                    "nutriments": {
                        "energy-kcal_100g": 42,
                        "proteins_100g": 0,
                        "fat_100g": 0,
                        "carbohydrates_100g": "10.6"
                    }
                }]}"#,
            )
            .create();

        let results = client(&server).search("cola", 10, 0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Coca-Cola");
        assert_eq!(results[0].source, Source::OpenFoodFacts);
        assert_eq!(results[0].carbs_per_100g, 10.6);
        assert_eq!(results[0].barcode.as_deref(), Some("5449000000996"));
        mock.assert();
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/123.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                w.write_all(b"{\"status\": 1, \"product\": ")?;
                std::thread::sleep(std::time::Duration::from_millis(500));
                w.write_all(b"{\"product_name\": \"Slow\"}}")
            })
            .create();

        let client =
            OpenFoodFactsClient::with_base_url(server.url(), Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = client.find_by_barcode("123").await.unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn status_zero_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/123.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": 0, "status_verbose": "product not found"}"#)
            .create();

        let result = client(&server).find_by_barcode("123").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn missing_product_payload_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/123.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": 1}"#)
            .create();

        let result = client(&server).find_by_barcode("123").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn http_404_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/123.json")
            .with_status(404)
            .create();

        let result = client(&server).find_by_barcode("123").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn barcode_hit_fills_missing_macros_with_zero() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/3017620422003.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status": 1, "product": {
                    "code": "3017620422003",
                    "product_name": "Nutella",
                    "nutriments": {"energy-kcal_100g": 539}
                }}"#,
            )
            .create();

        let product = client(&server)
            .find_by_barcode("3017620422003")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.calories_per_100g, 539.0);
        assert_eq!(product.protein_per_100g, 0.0);
        assert_eq!(product.fats_per_100g, 0.0);
    }

    #[tokio::test]
    async fn server_error_propagates() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/product/123.json")
            .with_status(500)
            .create();

        let err = client(&server).find_by_barcode("123").await.unwrap_err();
        assert!(matches!(err, ResolveError::UpstreamStatus { .. }));
    }

    #[tokio::test]
    async fn short_query_makes_no_network_call() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/cgi/search.pl").expect(0).create();
        let results = client(&server).search("x", 10, 0).await.unwrap();
        assert!(results.is_empty());
        mock.assert();
    }
}
