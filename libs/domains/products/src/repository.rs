use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ProductResult;
use crate::models::{CreateProduct, Product, ProductChanges, ProductFilter};

/// Repository trait for Product persistence
///
/// Implementations enforce name uniqueness themselves and report a clash
/// as [`ProductError::DuplicateName`](crate::ProductError::DuplicateName).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Insert a new product
    async fn create(&self, input: CreateProduct) -> ProductResult<Product>;

    async fn get_by_id(&self, id: Uuid) -> ProductResult<Option<Product>>;

    /// Products matching the price bounds, oldest first
    async fn list(&self, filter: ProductFilter) -> ProductResult<Vec<Product>>;

    /// Apply `changes` and return the updated product, or `None` if `id` is absent
    async fn update(&self, id: Uuid, changes: ProductChanges) -> ProductResult<Option<Product>>;

    /// Returns whether a product was removed
    async fn delete(&self, id: Uuid) -> ProductResult<bool>;
}
