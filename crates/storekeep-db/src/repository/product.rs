//! # Product Repository
//!
//! Catalog records. Every product is created together with its inventory
//! row, so stock can always be read by joining the two.
//!
//! ## Key Operations
//! - Create (product + inventory in one transaction)
//! - Lookup by id or SKU
//! - Pricing edits (cart and order snapshots are unaffected)

use chrono::Utc;
use sqlx::SqlitePool;
use storekeep_core::validation::{validate_new_product, validate_non_negative};
use storekeep_core::{generate_id, NewProduct, Product, DEFAULT_MIN_STOCK_LEVEL};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::StockWatch;
use crate::repository::select_product;

/// Repository for catalog operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let tea = repo.create(&NewProduct { sku: "TEA-250".into(), ..input }).await?;
/// let same = repo.get_by_sku("TEA-250").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    watch: StockWatch,
}

impl ProductRepository {
    pub(crate) fn new(pool: SqlitePool, watch: StockWatch) -> Self {
        ProductRepository { pool, watch }
    }

    /// Creates a product and its inventory row (quantity 0).
    ///
    /// ## Returns
    /// * `Err(DbError::Domain(Validation))` - bad SKU, name or amounts
    /// * `Err(DbError::UniqueViolation)` - SKU or barcode already used
    pub async fn create(&self, input: &NewProduct) -> DbResult<Product> {
        validate_new_product(input)?;

        let sku = input.sku.trim();
        debug!(sku = %sku, "Creating product");

        let id = generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, description, price_cents, cost_cents,
                min_stock_level, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(sku)
        .bind(input.barcode.as_deref())
        .bind(input.name.trim())
        .bind(input.description.as_deref())
        .bind(input.price_cents)
        .bind(input.cost_cents)
        .bind(input.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL))
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match DbError::from(e) {
                DbError::UniqueViolation { field, .. } if field == "products.sku" => {
                    DbError::duplicate("sku", sku)
                }
                other => other,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO inventory (id, product_id, quantity, location, updated_at)
            VALUES (?1, ?2, 0, '', ?3)
            "#,
        )
        .bind(generate_id())
        .bind(&id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let product = sqlx::query_as::<_, Product>(select_product!("WHERE p.id = ?1"))
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        self.watch.committed(None).await;

        info!(id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(select_product!("WHERE p.id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(select_product!("WHERE p.sku = ?1"))
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Active products ordered by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(select_product!(
            "WHERE p.is_active = 1 ORDER BY p.name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Changes catalog price, cost and minimum level.
    ///
    /// Prices already snapshotted on cart and order lines stay as they are.
    pub async fn update_pricing(
        &self,
        id: &str,
        price_cents: i64,
        cost_cents: i64,
        min_stock_level: i64,
    ) -> DbResult<Product> {
        validate_non_negative("price", price_cents)?;
        validate_non_negative("cost", cost_cents)?;
        validate_non_negative("min_stock_level", min_stock_level)?;

        debug!(id = %id, price_cents, min_stock_level, "Updating product pricing");

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE products SET
                price_cents = ?2, cost_cents = ?3, min_stock_level = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(price_cents)
        .bind(cost_cents)
        .bind(min_stock_level)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        let product = sqlx::query_as::<_, Product>(select_product!("WHERE p.id = ?1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        // a new minimum can move the product in or out of the low-stock list
        self.watch.committed(None).await;
        Ok(product)
    }

    /// Hides a product from the active catalog. Stock and history remain.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.watch.committed(None).await;
        info!(id = %id, "Product deactivated");
        Ok(())
    }
}
