//! Fixtures shared by the repository unit tests.

use chrono::{Duration, Utc};
use storekeep_core::{
    generate_id, Customer, Discount, DiscountKind, InventoryAction, NewCustomer, NewDiscount,
    NewProduct, Product,
};

use crate::repository::cart::Checkout;
use crate::{Database, DbConfig};

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn test_db_without_cache() -> Database {
    Database::new(DbConfig::in_memory().cache(false, std::time::Duration::ZERO))
        .await
        .unwrap()
}

/// Product named after its SKU, stocked through the ledger (one history row).
pub async fn test_product(
    db: &Database,
    sku: &str,
    price_cents: i64,
    stock: i64,
    min_stock_level: i64,
) -> Product {
    let product = db
        .products()
        .create(&NewProduct {
            sku: sku.to_string(),
            name: sku.to_string(),
            price_cents,
            min_stock_level: Some(min_stock_level),
            ..NewProduct::default()
        })
        .await
        .unwrap();

    db.inventory()
        .set_quantity(&product.id, stock, "Initial stock", InventoryAction::Restock, None)
        .await
        .unwrap();

    db.products().get(&product.id).await.unwrap().unwrap()
}

pub async fn test_customer(db: &Database, name: &str) -> Customer {
    db.customers()
        .create(&NewCustomer {
            name: name.to_string(),
            ..NewCustomer::default()
        })
        .await
        .unwrap()
}

pub async fn test_discount(
    db: &Database,
    code: &str,
    kind: DiscountKind,
    value: i64,
    usage_limit: Option<i64>,
) -> Discount {
    let now = Utc::now();
    db.discounts()
        .create(&NewDiscount {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            kind,
            value,
            min_order_cents: None,
            max_discount_cents: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            usage_limit,
        })
        .await
        .unwrap()
}

/// Fresh customer buying one unit of a fresh product priced `total_cents`.
pub async fn checkout_order(db: &Database, total_cents: i64) -> Checkout {
    let customer = test_customer(db, "Walk-in").await;
    let sku = format!("SKU-{}", &generate_id()[..8]);
    let product = test_product(db, &sku, total_cents, 50, 5).await;

    let cart = db.carts().active_cart(&customer.id).await.unwrap();
    db.carts().add_item(&cart.id, &product.id, 1).await.unwrap();
    db.carts().checkout(&cart.id, None).await.unwrap().unwrap()
}
