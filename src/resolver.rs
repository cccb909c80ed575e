//! Resolution orchestrator.
//!
//! Sequences the fallback chain for a query or barcode: search cache, then
//! the local store, then the primary external API, then the secondary one.
//! Local results always rank first and a full page from the store
//! short-circuits external calls entirely. Freshly discovered items are
//! persisted back to the store on detached tasks that never block or fail
//! the response. No error escapes the public operations; absence of data is
//! an empty list or `None`.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::builder::FoodResolverBuilder;
use crate::cache::SearchCache;
use crate::clients::{FoodApiClient, OpenFoodFactsClient, PrimaryClient};
use crate::config::AppConfig;
use crate::error::ResolveError;
use crate::model::Product;
use crate::store::LocalStore;

/// Top-level entry point for "find nutrition data for a food item".
pub struct FoodResolver {
    pub(crate) store: LocalStore,
    pub(crate) primary: Option<Arc<dyn FoodApiClient>>,
    pub(crate) secondary: Option<Arc<dyn FoodApiClient>>,
    pub(crate) cache: Mutex<SearchCache>,
}

impl FoodResolver {
    pub fn builder() -> FoodResolverBuilder {
        FoodResolverBuilder::new()
    }

    /// Direct access to the local product catalog (e.g. for user-entered
    /// items that never go through resolution).
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Assemble a resolver from configuration: local store plus the primary
    /// and secondary clients their enabled flags allow.
    pub async fn from_config(config: &AppConfig) -> Result<Self, ResolveError> {
        let mut builder = Self::builder().database_url(config.database_url.as_str());
        if config.api.enabled {
            builder = builder.primary(Arc::new(PrimaryClient::new(&config.api)?));
        }
        if config.fallback.enabled {
            builder = builder.secondary(Arc::new(OpenFoodFactsClient::new(&config.fallback)?));
        }
        builder.build().await
    }

    /// Search the fallback chain for products matching `query`.
    ///
    /// Ordering contract: local results precede API results; within each
    /// group the sub-ordering (usage rank, upstream order) is preserved. The
    /// list is truncated to `limit`. Never returns an error: degraded states
    /// degrade to fewer or local-only results.
    pub async fn resolve(&self, query: &str, limit: u32) -> Vec<Product> {
        let query = query.trim();
        if query.chars().count() < 2 || limit == 0 {
            return Vec::new();
        }

        if let Some(cached) = self.cache.lock().await.get(query, limit) {
            debug!("cache hit for {query:?}");
            let mut results = cached.to_vec();
            results.truncate(limit as usize);
            return results;
        }

        let local = self.store.search(query, limit).await;
        if local.len() >= limit as usize {
            // a full page from the store short-circuits external calls
            self.cache.lock().await.set(query, limit, local.clone());
            return local;
        }

        let remaining = limit - local.len() as u32;
        let api_results = self.search_external(query, remaining).await;
        for product in &api_results {
            self.write_back(product.clone());
        }

        let mut results = local;
        results.extend(api_results);
        results.truncate(limit as usize);
        self.cache.lock().await.set(query, limit, results.clone());
        results
    }

    /// Primary first; an empty primary result or a primary error both fall
    /// through to the secondary; a secondary failure degrades to nothing.
    async fn search_external(&self, query: &str, remaining: u32) -> Vec<Product> {
        if let Some(primary) = &self.primary {
            match primary.search(query, remaining, 0).await {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => debug!("primary returned no results for {query:?}, falling back"),
                Err(e) => warn!("primary search failed for {query:?}: {e}"),
            }
        }
        if let Some(secondary) = &self.secondary {
            match secondary.search(query, remaining, 0).await {
                Ok(results) => return results,
                Err(e) => warn!("fallback search failed for {query:?}: {e}"),
            }
        }
        Vec::new()
    }

    /// Look a product up by barcode: local store, then primary, then
    /// secondary. `None` means not found anywhere; errors never escape.
    pub async fn resolve_by_barcode(&self, barcode: &str) -> Option<Product> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return None;
        }

        match self.store.get_by_barcode(barcode).await {
            Ok(Some(product)) => return Some(product),
            Ok(None) => {}
            Err(e) => warn!("local barcode lookup failed for {barcode:?}: {e}"),
        }

        if let Some(primary) = &self.primary {
            match primary.find_by_barcode(barcode).await {
                Ok(Some(mut product)) => {
                    // the primary API does not echo the barcode back
                    product.barcode = Some(barcode.to_string());
                    self.write_back(product.clone());
                    return Some(product);
                }
                Ok(None) => debug!("primary has no product for barcode {barcode:?}"),
                Err(e) => warn!("primary barcode lookup failed for {barcode:?}: {e}"),
            }
        }

        if let Some(secondary) = &self.secondary {
            match secondary.find_by_barcode(barcode).await {
                Ok(Some(product)) => {
                    self.write_back(product.clone());
                    return Some(product);
                }
                Ok(None) => {}
                Err(e) => warn!("fallback barcode lookup failed for {barcode:?}: {e}"),
            }
        }

        None
    }

    /// Record that a product was chosen by the caller. Persistence is
    /// advisory: a failure is logged and swallowed.
    pub async fn mark_used(&self, id: i64) {
        if let Err(e) = self.store.increment_usage(id).await {
            warn!("usage increment failed for product {id}: {e}");
        }
    }

    /// Detached write-back of a freshly discovered product. The caller never
    /// waits on it and its failure never surfaces.
    fn write_back(&self, product: Product) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_if_new(&product).await {
                warn!("write-back failed for {:?}: {e}", product.name);
            }
        });
    }

    /// Sweep expired entries out of the search cache.
    pub async fn cleanup_cache(&self) {
        self.cache.lock().await.cleanup();
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}
