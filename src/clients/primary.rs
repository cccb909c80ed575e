//! Primary nutrition API client (FatSecret-style platform API).
//!
//! All operations go through one endpoint selected by a `method` query
//! parameter and authorized with an OAuth bearer token obtained via the
//! client-credentials grant. The token is cached on the instance with its
//! expiry timestamp. Transient failures (5xx, 429, timeout) are retried with
//! exponential backoff; other 4xx responses fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use crate::clients::FoodApiClient;
use crate::config::ApiConfig;
use crate::error::ResolveError;
use crate::model::{Product, Source};
use crate::normalize;

const SOURCE_NAME: &str = "primary API";
/// Additional attempts after the first failed request
const RETRY_ATTEMPTS: u32 = 2;
/// Refresh the bearer token this long before it actually expires
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Upstream is inconsistent about single-item vs array payloads; this folds
/// both shapes into a list right after deserialization.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// A food record in the primary API's native schema. Numeric fields arrive
/// as strings and stay that way until normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct Food {
    pub food_id: Option<String>,
    pub food_name: Option<String>,
    pub brand_name: Option<String>,
    pub food_image: Option<String>,
    pub servings: Option<Servings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Servings {
    #[serde(deserialize_with = "one_or_many_servings")]
    pub serving: Vec<FoodServing>,
}

fn one_or_many_servings<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> Result<Vec<FoodServing>, D::Error> {
    Ok(OneOrMany::<FoodServing>::deserialize(d)?.into_vec())
}

#[derive(Debug, Clone, Deserialize)]
pub struct FoodServing {
    pub metric_serving_amount: Option<String>,
    pub metric_serving_unit: Option<String>,
    pub number_of_units: Option<String>,
    pub measurement_description: Option<String>,
    pub calories: Option<String>,
    pub protein: Option<String>,
    pub fat: Option<String>,
    pub carbohydrate: Option<String>,
    pub fiber: Option<String>,
    pub sodium: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    foods: Option<FoodsPayload>,
}

#[derive(Debug, Deserialize)]
struct FoodsPayload {
    food: Option<OneOrMany<Food>>,
}

#[derive(Debug, Deserialize)]
struct FoodEnvelope {
    food: Option<Food>,
}

#[derive(Debug, Deserialize)]
struct BarcodeEnvelope {
    food_id: Option<BarcodeFoodId>,
}

#[derive(Debug, Deserialize)]
struct BarcodeFoodId {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Client for the OAuth-gated primary nutrition API.
pub struct PrimaryClient {
    http: Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    retry_delay: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl PrimaryClient {
    /// Create a client from configuration. Credentials fall back to the
    /// `NUTRIFIND_CLIENT_ID` / `NUTRIFIND_CLIENT_SECRET` environment
    /// variables when not present in the config.
    pub fn new(config: &ApiConfig) -> Result<Self, ResolveError> {
        let client_id = config
            .client_id
            .clone()
            .or_else(|| std::env::var("NUTRIFIND_CLIENT_ID").ok())
            .ok_or_else(|| {
                ResolveError::Builder("client_id not found in config or environment".to_string())
            })?;
        let client_secret = config
            .client_secret
            .clone()
            .or_else(|| std::env::var("NUTRIFIND_CLIENT_SECRET").ok())
            .ok_or_else(|| {
                ResolveError::Builder(
                    "client_secret not found in config or environment".to_string(),
                )
            })?;

        let timeout = Duration::from_millis(config.timeout_ms);
        Ok(Self {
            // the client-level timeout backstops the per-request wrapper
            http: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.clone(),
            token_url: config.token_url.clone(),
            client_id,
            client_secret,
            timeout,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            token: Mutex::new(None),
        })
    }

    #[doc(hidden)]
    pub fn with_base_urls(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_millis(5000),
            retry_delay: Duration::from_millis(10),
            token: Mutex::new(None),
        }
    }

    #[doc(hidden)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get a valid bearer token, refreshing via the client-credentials grant
    /// when the cached one is missing or about to expire.
    async fn bearer_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("fetching new access token");
        let fetch = async {
            let response = self
                .http
                .post(&self.token_url)
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .form(&[("grant_type", "client_credentials"), ("scope", "basic")])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ResolveError::Auth(format!(
                    "token endpoint returned HTTP {}",
                    response.status()
                )));
            }
            Ok(response.json::<TokenResponse>().await?)
        };
        let token: TokenResponse = timeout(self.timeout, fetch)
            .await
            .map_err(|_| ResolveError::Timeout {
                upstream: SOURCE_NAME,
                timeout: self.timeout,
            })??;
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in)
            - TOKEN_EXPIRY_SLACK.min(Duration::from_secs(token.expires_in));
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at,
        });
        Ok(access_token)
    }

    /// One request attempt: bearer auth, timeout, status classification.
    /// The timeout spans the whole exchange so a stalled response body
    /// surfaces as a retryable [`ResolveError::Timeout`].
    async fn attempt(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ResolveError> {
        let token = self.bearer_token().await?;
        let request = async {
            let response = self
                .http
                .post(&self.base_url)
                .query(params)
                .query(&[("format", "json")])
                .bearer_auth(token)
                .send()
                .await?;

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

    /// Issue a request, retrying transient failures with a doubling delay.
    /// After the retry budget is spent the last error propagates; fallback
    /// is the orchestrator's job, never this client's.
    async fn call(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ResolveError> {
        let mut delay = self.retry_delay;
        let mut attempt = 0;
        loop {
            match self.attempt(params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    attempt += 1;
                    warn!(
                        "primary API attempt {attempt}/{} failed, retrying in {delay:?}: {e}",
                        RETRY_ATTEMPTS + 1
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl FoodApiClient for PrimaryClient {
    fn source(&self) -> Source {
        Source::FatSecret
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

        let max_results = max_results.to_string();
        let page = page.to_string();
        let value = self
            .call(&[
                ("method", "foods.search"),
                ("search_expression", query),
                ("max_results", &max_results),
                ("page_number", &page),
            ])
            .await?;

        let envelope: SearchEnvelope =
            serde_json::from_value(value).map_err(|e| ResolveError::UnexpectedResponse {
                upstream: SOURCE_NAME,
                detail: e.to_string(),
            })?;

        let foods = envelope
            .foods
            .and_then(|f| f.food)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();

        Ok(foods
            .iter()
            .filter_map(|food| match normalize::primary_food_to_product(food) {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(
                        "skipping unnormalizable search result {:?}: {e}",
                        food.food_name
                    );
                    None
                }
            })
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Product>, ResolveError> {
        let value = self
            .call(&[("method", "food.get"), ("food_id", id)])
            .await?;

        let envelope: FoodEnvelope =
            serde_json::from_value(value).map_err(|e| ResolveError::UnexpectedResponse {
                upstream: SOURCE_NAME,
                detail: e.to_string(),
            })?;

        match envelope.food {
            Some(food) => Ok(Some(normalize::primary_food_to_product(&food)?)),
            None => Ok(None),
        }
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, ResolveError> {
        let value = self
            .call(&[("method", "food.find_id_for_barcode"), ("barcode", barcode)])
            .await?;

        let envelope: BarcodeEnvelope =
            serde_json::from_value(value).map_err(|e| ResolveError::UnexpectedResponse {
                upstream: SOURCE_NAME,
                detail: e.to_string(),
            })?;

        // the API signals "unknown barcode" with id 0 rather than an error
        let food_id = match envelope.food_id.and_then(|f| f.value) {
            Some(id) if !id.is_empty() && id != "0" => id,
            _ => return Ok(None),
        };

        self.get_by_id(&food_id).await
    }
}
