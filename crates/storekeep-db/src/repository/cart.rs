//! # Cart & Checkout
//!
//! A customer has at most one active cart, referenced by
//! `customers.active_cart_id`. Cart lines snapshot the product price on first
//! add and never touch inventory. Stock is taken later, when the order is
//! confirmed.
//!
//! ## Checkout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── claim cart row (inactive or empty → None, nothing written)        │
//! │   ├── INSERT orders        subtotal = total = Σ qty × price             │
//! │   ├── INSERT order_items   one per cart line, price copied              │
//! │   ├── DELETE cart_items                                                 │
//! │   ├── carts.is_active = 0, customers.active_cart_id = NULL              │
//! │   └── INSERT debts         initial = remaining = total                  │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::debt::requires_debt;
use storekeep_core::validation::validate_quantity;
use storekeep_core::{
    cart_total, generate_id, generate_order_number, Cart, CartItem, CoreError, Debt, Money, Order,
    OrderItem, OrderStatus, PaymentStatus,
};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::debt::open_debt;
use crate::repository::order::{ORDER_COLUMNS, ORDER_ITEM_COLUMNS};

const CART_COLUMNS: &str = "id, customer_id, is_active, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, price_cents, added_at";

/// Everything a successful checkout created.
#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub debt: Option<Debt>,
}

/// Locks the cart row and returns it.
async fn claim(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<Cart> {
    let sql = format!(
        "UPDATE carts SET updated_at = ?2 WHERE id = ?1 RETURNING {}",
        CART_COLUMNS
    );
    sqlx::query_as::<_, Cart>(&sql)
        .bind(cart_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Cart", cart_id))
}

async fn claim_active(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<Cart> {
    let cart = claim(conn, cart_id).await?;
    if !cart.is_active {
        return Err(CoreError::CartInactive(cart.id).into());
    }
    Ok(cart)
}

async fn fetch_items(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<Vec<CartItem>> {
    let sql = format!(
        "SELECT {} FROM cart_items WHERE cart_id = ?1 ORDER BY added_at, rowid",
        CART_ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, CartItem>(&sql)
        .bind(cart_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
    debt_term_days: i64,
}

impl CartRepository {
    pub(crate) fn new(pool: SqlitePool, debt_term_days: i64) -> Self {
        CartRepository {
            pool,
            debt_term_days,
        }
    }

    /// Returns the customer's active cart, creating it if there is none.
    pub async fn active_cart(&self, customer_id: &str) -> DbResult<Cart> {
        let mut tx = self.pool.begin().await?;

        let active: Option<String> = sqlx::query_scalar(
            "UPDATE customers SET updated_at = ?2 WHERE id = ?1 RETURNING active_cart_id",
        )
        .bind(customer_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        if let Some(cart_id) = active {
            let sql = format!("SELECT {} FROM carts WHERE id = ?1", CART_COLUMNS);
            let cart = sqlx::query_as::<_, Cart>(&sql)
                .bind(&cart_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(cart);
        }

        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO carts (id, customer_id, is_active, created_at, updated_at)
            VALUES (?1, ?2, 1, ?3, ?3)
            RETURNING {}
            "#,
            CART_COLUMNS
        );
        let cart = sqlx::query_as::<_, Cart>(&sql)
            .bind(generate_id())
            .bind(customer_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE customers SET active_cart_id = ?2 WHERE id = ?1")
            .bind(customer_id)
            .bind(&cart.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(customer_id = %customer_id, cart_id = %cart.id, "Cart opened");
        Ok(cart)
    }

    pub async fn get(&self, cart_id: &str) -> DbResult<Option<Cart>> {
        let sql = format!("SELECT {} FROM carts WHERE id = ?1", CART_COLUMNS);
        let cart = sqlx::query_as::<_, Cart>(&sql)
            .bind(cart_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cart)
    }

    pub async fn items(&self, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, cart_id).await
    }

    /// Σ quantity × price, computed from the current lines.
    pub async fn total(&self, cart_id: &str) -> DbResult<Money> {
        Ok(cart_total(&self.items(cart_id).await?))
    }

    /// Adds `quantity` units of a product.
    ///
    /// An existing line for the product is incremented in place and keeps
    /// its original price. A new line snapshots the current catalog price.
    pub async fn add_item(
        &self,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<CartItem> {
        validate_quantity(quantity)?;
        debug!(cart_id = %cart_id, product_id = %product_id, quantity, "Adding to cart");

        let mut tx = self.pool.begin().await?;
        claim_active(&mut tx, cart_id).await?;

        let price_cents: i64 = sqlx::query_scalar("SELECT price_cents FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        let sql = format!(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, price_cents, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (cart_id, product_id)
                DO UPDATE SET quantity = cart_items.quantity + excluded.quantity
            RETURNING {}
            "#,
            CART_ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, CartItem>(&sql)
            .bind(generate_id())
            .bind(cart_id)
            .bind(product_id)
            .bind(quantity)
            .bind(price_cents)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        // combined line over the limit: drop the transaction
        validate_quantity(item.quantity)?;

        tx.commit().await?;
        Ok(item)
    }

    /// Overwrites a line's quantity. `quantity <= 0` removes the line.
    ///
    /// Returns `None` when the product is not in the cart or was removed.
    pub async fn update_item_quantity(
        &self,
        cart_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<Option<CartItem>> {
        if quantity <= 0 {
            self.remove_item(cart_id, product_id).await?;
            return Ok(None);
        }
        validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;
        claim_active(&mut tx, cart_id).await?;

        let sql = format!(
            "UPDATE cart_items SET quantity = ?3 WHERE cart_id = ?1 AND product_id = ?2 RETURNING {}",
            CART_ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, CartItem>(&sql)
            .bind(cart_id)
            .bind(product_id)
            .bind(quantity)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(item)
    }

    /// Returns whether a line was removed.
    pub async fn remove_item(&self, cart_id: &str, product_id: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        claim_active(&mut tx, cart_id).await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1 AND product_id = ?2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every line. Returns how many were removed.
    pub async fn clear(&self, cart_id: &str) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        claim_active(&mut tx, cart_id).await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(cart_id = %cart_id, removed = result.rows_affected(), "Cart cleared");
        Ok(result.rows_affected())
    }

    /// Converts the cart into an order.
    ///
    /// ## Returns
    /// * `Ok(None)` - cart is empty or already checked out; nothing written
    /// * `Ok(Some(checkout))` - order, its items and the opened debt
    /// * `Err(DbError::NotFound)` - no such cart
    pub async fn checkout(&self, cart_id: &str, actor: Option<&str>) -> DbResult<Option<Checkout>> {
        let mut tx = self.pool.begin().await?;

        let cart = claim(&mut tx, cart_id).await?;
        if !cart.is_active {
            warn!(cart_id = %cart_id, "Checkout of inactive cart declined");
            return Ok(None);
        }

        let lines = fetch_items(&mut tx, cart_id).await?;
        if lines.is_empty() {
            warn!(cart_id = %cart_id, "Checkout of empty cart declined");
            return Ok(None);
        }

        let subtotal = cart_total(&lines);
        let now = Utc::now();
        let order_id = generate_id();

        let sql = format!(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, status, payment_status,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                discount_code, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?6, NULL, NULL, ?7, ?7)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(&order_id)
            .bind(generate_order_number())
            .bind(&cart.customer_id)
            .bind(OrderStatus::Pending)
            .bind(PaymentStatus::Pending)
            .bind(subtotal.cents())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        let item_sql = format!(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {}
            "#,
            ORDER_ITEM_COLUMNS
        );
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = sqlx::query_as::<_, OrderItem>(&item_sql)
                .bind(generate_id())
                .bind(&order.id)
                .bind(&line.product_id)
                .bind(line.quantity)
                .bind(line.price_cents)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
            items.push(item);
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(cart_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE customers SET active_cart_id = NULL, updated_at = ?3 \
             WHERE id = ?1 AND active_cart_id = ?2",
        )
        .bind(&cart.customer_id)
        .bind(cart_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let debt = if requires_debt(order.payment_status) {
            Some(open_debt(&mut tx, &order, self.debt_term_days).await?)
        } else {
            None
        };

        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            total = %order.total(),
            items = items.len(),
            actor = actor.unwrap_or("-"),
            "Checkout complete"
        );

        Ok(Some(Checkout { order, items, debt }))
    }
}
