mod primary;
mod secondary;

pub use primary::{Food, FoodServing, PrimaryClient, Servings};
pub use secondary::{OffNutriments, OffProduct, OpenFoodFactsClient};

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::model::{Product, Source};

/// Unified interface over the external nutrition APIs.
///
/// Implementations return fully normalized [`Product`]s; raw upstream schemas
/// and the one-vs-array response ambiguity never cross this boundary. An item
/// that fails normalization is logged and dropped, never aborts the batch.
#[async_trait]
pub trait FoodApiClient: Send + Sync {
    /// Which source this client's products are tagged with
    fn source(&self) -> Source;

    /// Text search. Queries shorter than 2 characters short-circuit to an
    /// empty list without a network call.
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        page: u32,
    ) -> Result<Vec<Product>, ResolveError>;

    /// Fetch one item by its source-native identifier.
    async fn get_by_id(&self, id: &str) -> Result<Option<Product>, ResolveError>;

    /// Barcode lookup. `Ok(None)` means a valid "not found", not an error.
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, ResolveError>;
}
