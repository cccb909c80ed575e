//! Builder for assembling a [`FoodResolver`] from parts.
//!
//! Production code usually goes through [`FoodResolver::from_config`]; the
//! builder exists so callers (and tests) can inject their own store, clients,
//! or cache limits without touching global state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::SearchCache;
use crate::clients::FoodApiClient;
use crate::error::ResolveError;
use crate::resolver::FoodResolver;
use crate::store::LocalStore;

#[derive(Default)]
pub struct FoodResolverBuilder {
    store: Option<LocalStore>,
    database_url: Option<String>,
    primary: Option<Arc<dyn FoodApiClient>>,
    secondary: Option<Arc<dyn FoodApiClient>>,
    cache_limits: Option<(Duration, usize)>,
}

impl FoodResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already-connected local store.
    pub fn store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Connect the local store from a database URL at build time.
    /// Ignored when an explicit store was provided.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the primary external client. Without one, resolution skips
    /// straight to the secondary (or stays local-only).
    pub fn primary(mut self, client: Arc<dyn FoodApiClient>) -> Self {
        self.primary = Some(client);
        self
    }

    /// Set the secondary (fallback) external client.
    pub fn secondary(mut self, client: Arc<dyn FoodApiClient>) -> Self {
        self.secondary = Some(client);
        self
    }

    /// Override the search cache's TTL and capacity.
    pub fn cache_limits(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_limits = Some((ttl, capacity));
        self
    }

    /// Build the resolver. Fails when neither a store nor a database URL was
    /// configured - a resolver without a local store has nowhere to rank or
    /// persist results.
    pub async fn build(self) -> Result<FoodResolver, ResolveError> {
        let store = match (self.store, self.database_url) {
            (Some(store), _) => store,
            (None, Some(url)) => LocalStore::connect(&url).await?,
            (None, None) => {
                return Err(ResolveError::Builder(
                    "a store or database_url is required".to_string(),
                ))
            }
        };

        let cache = match self.cache_limits {
            Some((ttl, capacity)) => SearchCache::with_limits(ttl, capacity),
            None => SearchCache::new(),
        };

        Ok(FoodResolver {
            store,
            primary: self.primary,
            secondary: self.secondary,
            cache: Mutex::new(cache),
        })
    }
}
