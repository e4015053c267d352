//! MongoDB repository tests against a real server in a container.
//!
//! Run with `cargo test -p domain_products -- --ignored` (requires Docker).

use domain_products::*;
use ::mongodb::bson::{Bson, Document, doc};
use rust_decimal::Decimal;
use std::str::FromStr;
use test_utils::{TestDataBuilder, TestMongo};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn input(name: &str, price: &str) -> CreateProduct {
    CreateProduct {
        name: name.to_string(),
        quantity: 5,
        price: dec(price),
        status: true,
    }
}

async fn repository(mongo: &TestMongo, test_name: &str) -> MongoProductRepository {
    let builder = TestDataBuilder::from_test_name(test_name);
    let repo = MongoProductRepository::new(&mongo.database(&builder.database_name()));
    repo.init_indexes().await.unwrap();
    repo
}

#[tokio::test]
#[ignore] // Requires actual MongoDB
async fn test_price_is_stored_as_decimal128_and_reads_back_exactly() {
    let mongo = TestMongo::new().await;
    let builder = TestDataBuilder::from_test_name("mongo_decimal_round_trip");
    let db = mongo.database(&builder.database_name());
    let repo = MongoProductRepository::new(&db);

    let created = repo.create(input("Lamp", "19.99")).await.unwrap();

    let raw = db
        .collection::<Document>("products")
        .find_one(doc! {})
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(raw.get("price"), Some(Bson::Decimal128(_))));

    let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.price.to_string(), "19.99");
    assert_eq!(fetched, created);
}

#[tokio::test]
#[ignore] // Requires actual MongoDB
async fn test_duplicate_name_is_reported() {
    let mongo = TestMongo::new().await;
    let repo = repository(&mongo, "mongo_duplicate_name").await;

    repo.create(input("Lamp", "19.99")).await.unwrap();
    let result = repo.create(input("Lamp", "5.00")).await;

    assert!(matches!(result, Err(ProductError::DuplicateName(name)) if name == "Lamp"));
    assert_eq!(repo.list(ProductFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // Requires actual MongoDB
async fn test_list_price_bounds_are_inclusive() {
    let mongo = TestMongo::new().await;
    let repo = repository(&mongo, "mongo_price_bounds").await;

    for (name, price) in [("below", "9.99"), ("at-min", "10"), ("at-max", "20.00"), ("above", "20.01")] {
        repo.create(input(name, price)).await.unwrap();
    }

    let products = repo
        .list(ProductFilter {
            min_price: Some(dec("10.00")),
            max_price: Some(dec("20")),
        })
        .await
        .unwrap();

    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["at-min", "at-max"]);
}

#[tokio::test]
#[ignore] // Requires actual MongoDB
async fn test_update_changes_only_supplied_fields() {
    let mongo = TestMongo::new().await;
    let repo = repository(&mongo, "mongo_partial_update").await;
    let created = repo.create(input("Chair", "45.00")).await.unwrap();

    let changes = ProductChanges {
        quantity: None,
        price: None,
        status: Some(false),
        updated_at: models::now(),
    };
    let updated = repo.update(created.id, changes).await.unwrap().unwrap();

    assert!(!updated.status);
    assert_eq!(updated.name, created.name);
    assert_eq!(updated.quantity, created.quantity);
    assert_eq!(updated.price, created.price);
    assert_eq!(updated.created_at, created.created_at);
}

#[tokio::test]
#[ignore] // Requires actual MongoDB
async fn test_update_and_delete_missing_id() {
    let mongo = TestMongo::new().await;
    let repo = repository(&mongo, "mongo_missing_id").await;
    let missing = TestDataBuilder::from_test_name("mongo_missing_id").id();

    let changes = ProductChanges {
        quantity: Some(1),
        price: None,
        status: None,
        updated_at: models::now(),
    };
    assert!(repo.update(missing, changes).await.unwrap().is_none());
    assert!(!repo.delete(missing).await.unwrap());
}
