//! Multi-source food product resolution.
//!
//! Answers "find nutrition data for a food item" by orchestrating a local
//! product catalog, an OAuth-gated primary nutrition API, and a token-less
//! secondary API, with query caching, retry/backoff, fallback, and
//! write-back of newly discovered items.

pub mod builder;
pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod resolver;
pub mod serving;
pub mod store;

pub use builder::FoodResolverBuilder;
pub use cache::SearchCache;
pub use clients::{FoodApiClient, OpenFoodFactsClient, PrimaryClient};
pub use config::AppConfig;
pub use error::ResolveError;
pub use model::{Product, Source};
pub use resolver::FoodResolver;
pub use serving::{resolve_to_100, RawServing};
pub use store::LocalStore;

/// Convenience: load configuration, build a resolver, and run one search.
///
/// Long-lived callers should build a [`FoodResolver`] once and reuse it so
/// the cache and token state survive between calls.
pub async fn resolve_foods(query: &str, limit: u32) -> Result<Vec<Product>, ResolveError> {
    let config = AppConfig::load()?;
    let resolver = FoodResolver::from_config(&config).await?;
    Ok(resolver.resolve(query, limit).await)
}

/// Convenience: load configuration, build a resolver, and run one barcode
/// lookup.
pub async fn resolve_barcode(barcode: &str) -> Result<Option<Product>, ResolveError> {
    let config = AppConfig::load()?;
    let resolver = FoodResolver::from_config(&config).await?;
    Ok(resolver.resolve_by_barcode(barcode).await)
}
