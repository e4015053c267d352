//! MongoDB implementation of ProductRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{self, Bson, Decimal128, Document, doc},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::decimal::{from_decimal128, to_decimal128};
use crate::error::{ProductError, ProductResult};
use crate::models::{CreateProduct, Product, ProductChanges, ProductFilter};
use crate::repository::ProductRepository;

pub const DEFAULT_COLLECTION: &str = "products";
pub const NAME_INDEX: &str = "idx_name_unique";
pub const PRICE_INDEX: &str = "idx_price";

const DUPLICATE_KEY: i32 = 11000;

/// Stored shape of a product: binary `_id`, `Decimal128` price and BSON dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProductDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    name: String,
    quantity: i64,
    price: Decimal128,
    status: bool,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl From<&Product> for ProductDocument {
    fn from(product: &Product) -> Self {
        Self {
            id: bson_uuid(product.id),
            name: product.name.clone(),
            quantity: product.quantity,
            price: to_decimal128(product.price),
            status: product.status,
            created_at: bson_datetime(product.created_at),
            updated_at: bson_datetime(product.updated_at),
        }
    }
}

impl TryFrom<ProductDocument> for Product {
    type Error = ProductError;

    fn try_from(doc: ProductDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::from_bytes(doc.id.bytes()),
            name: doc.name,
            quantity: doc.quantity,
            price: from_decimal128(doc.price)?,
            status: doc.status,
            created_at: chrono_datetime(doc.created_at)?,
            updated_at: chrono_datetime(doc.updated_at)?,
        })
    }
}

/// `_id` is always BSON binary subtype 4, whichever serializer writes it.
fn bson_uuid(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

fn bson_datetime(value: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(value.timestamp_millis())
}

fn chrono_datetime(value: bson::DateTime) -> ProductResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).ok_or_else(|| {
        ProductError::Database(format!("Stored timestamp {} is out of range", value))
    })
}

/// MongoDB implementation of the ProductRepository
pub struct MongoProductRepository {
    collection: Collection<ProductDocument>,
}

impl MongoProductRepository {
    /// Repository over the default `products` collection
    pub fn new(db: &Database) -> Self {
        Self::with_collection(db, DEFAULT_COLLECTION)
    }

    pub fn with_collection(db: &Database, collection_name: &str) -> Self {
        let collection = db.collection::<ProductDocument>(collection_name);
        Self { collection }
    }

    /// Create the unique name index and the price range index.
    ///
    /// Idempotent; safe to call on every startup.
    pub async fn init_indexes(&self) -> ProductResult<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(NAME_INDEX.to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "price": 1 })
                .options(IndexOptions::builder().name(PRICE_INDEX.to_string()).build())
                .build(),
        ];

        self.collection.create_indexes(indexes).await?;
        tracing::info!(
            collection = self.collection.name(),
            "Product indexes created successfully"
        );
        Ok(())
    }

    /// Build a MongoDB filter document from ProductFilter
    fn build_filter(filter: &ProductFilter) -> Document {
        let mut doc = doc! {};

        if filter.min_price.is_some() || filter.max_price.is_some() {
            let mut price_filter = doc! {};
            if let Some(min) = filter.min_price {
                price_filter.insert("$gte", Bson::Decimal128(to_decimal128(min)));
            }
            if let Some(max) = filter.max_price {
                price_filter.insert("$lte", Bson::Decimal128(to_decimal128(max)));
            }
            doc.insert("price", price_filter);
        }

        doc
    }

    /// `$set` document touching only the supplied fields plus `updated_at`.
    fn build_update(changes: &ProductChanges) -> Document {
        let mut set = doc! { "updated_at": bson_datetime(changes.updated_at) };

        if let Some(quantity) = changes.quantity {
            set.insert("quantity", quantity);
        }
        if let Some(price) = changes.price {
            set.insert("price", Bson::Decimal128(to_decimal128(price)));
        }
        if let Some(status) = changes.status {
            set.insert("status", status);
        }

        doc! { "$set": set }
    }

    fn id_filter(id: Uuid) -> Document {
        doc! { "_id": bson_uuid(id) }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl ProductRepository for MongoProductRepository {
    #[instrument(skip(self, input), fields(product_name = %input.name))]
    async fn create(&self, input: CreateProduct) -> ProductResult<Product> {
        let product = Product::new(input);

        self.collection
            .insert_one(ProductDocument::from(&product))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ProductError::DuplicateName(product.name.clone())
                } else {
                    e.into()
                }
            })?;

        tracing::info!(product_id = %product.id, "Product created successfully");
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> ProductResult<Option<Product>> {
        self.collection
            .find_one(Self::id_filter(id))
            .await?
            .map(Product::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: ProductFilter) -> ProductResult<Vec<Product>> {
        let documents: Vec<ProductDocument> = self
            .collection
            .find(Self::build_filter(&filter))
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;

        documents.into_iter().map(Product::try_from).collect()
    }

    #[instrument(skip(self, changes))]
    async fn update(&self, id: Uuid, changes: ProductChanges) -> ProductResult<Option<Product>> {
        let updated = self
            .collection
            .find_one_and_update(Self::id_filter(id), Self::build_update(&changes))
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(doc) => {
                tracing::info!(product_id = %id, "Product updated successfully");
                Product::try_from(doc).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> ProductResult<bool> {
        let result = self.collection.delete_one(Self::id_filter(id)).await?;

        if result.deleted_count > 0 {
            tracing::info!(product_id = %id, "Product deleted successfully");
        }
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_build_filter_empty() {
        let doc = MongoProductRepository::build_filter(&ProductFilter::default());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_build_filter_with_price_range() {
        let filter = ProductFilter {
            min_price: Some(dec("10.00")),
            max_price: Some(dec("99.99")),
        };
        let doc = MongoProductRepository::build_filter(&filter);
        let price = doc.get_document("price").unwrap();

        assert_eq!(
            price.get("$gte"),
            Some(&Bson::Decimal128(to_decimal128(dec("10.00"))))
        );
        assert_eq!(
            price.get("$lte"),
            Some(&Bson::Decimal128(to_decimal128(dec("99.99"))))
        );
    }

    #[test]
    fn test_build_filter_with_min_only() {
        let filter = ProductFilter {
            min_price: Some(dec("5")),
            max_price: None,
        };
        let doc = MongoProductRepository::build_filter(&filter);
        let price = doc.get_document("price").unwrap();

        assert!(price.contains_key("$gte"));
        assert!(!price.contains_key("$lte"));
    }

    #[test]
    fn test_build_update_sets_only_supplied_fields() {
        let changes = ProductChanges {
            quantity: None,
            price: None,
            status: Some(false),
            updated_at: Utc::now(),
        };
        let update = MongoProductRepository::build_update(&changes);
        let set = update.get_document("$set").unwrap();

        assert!(!set.get_bool("status").unwrap());
        assert!(set.contains_key("updated_at"));
        assert!(!set.contains_key("quantity"));
        assert!(!set.contains_key("price"));
        assert!(!set.contains_key("name"));
    }

    #[test]
    fn test_document_round_trip_keeps_price_exact() {
        let product = Product::new(CreateProduct {
            name: "Lamp".to_string(),
            quantity: 4,
            price: dec("19.99"),
            status: true,
        });

        let stored = ProductDocument::from(&product);
        let bson = bson::to_document(&stored).unwrap();
        assert!(matches!(bson.get("price"), Some(Bson::Decimal128(_))));
        assert!(matches!(bson.get("created_at"), Some(Bson::DateTime(_))));

        let restored = Product::try_from(bson::from_document::<ProductDocument>(bson).unwrap())
            .unwrap();
        assert_eq!(restored, product);
    }

    #[test]
    fn test_stored_id_matches_id_filter() {
        let product = Product::new(CreateProduct {
            name: "Desk".to_string(),
            quantity: 1,
            price: dec("120.00"),
            status: true,
        });

        // Same byte encoding the driver uses for inserts
        let bytes = bson::to_vec(&ProductDocument::from(&product)).unwrap();
        let stored = Document::from_reader(&mut bytes.as_slice()).unwrap();
        let filter = MongoProductRepository::id_filter(product.id);

        assert_eq!(stored.get("_id"), filter.get("_id"));
        assert!(matches!(
            stored.get("_id"),
            Some(Bson::Binary(binary)) if binary.subtype == bson::spec::BinarySubtype::Uuid
        ));

        let restored =
            Product::try_from(bson::from_document::<ProductDocument>(stored).unwrap()).unwrap();
        assert_eq!(restored.id, product.id);
    }
}
