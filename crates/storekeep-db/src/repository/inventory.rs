//! # Inventory Ledger
//!
//! Every quantity change writes the new value and exactly one history row in
//! the same transaction, then evaluates the low-stock rule.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── UPDATE inventory ... RETURNING      (claims the row: lock held)   │
//! │   ├── INSERT inventory_history            (old, new, new − old)         │
//! │   └── quantity <= min_stock_level ?                                     │
//! │          └── INSERT notifications (low_stock)                           │
//! │  COMMIT                                                                 │
//! │   └── StockWatch::committed                                             │
//! │          ├── low-stock cache invalidated                                │
//! │          └── alert email queued (fire-and-forget)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale decrements use a conditional update (`quantity >= ?`) so a shortfall
//! is detected atomically and reported as [`StockOutcome::Insufficient`].

use std::sync::Arc;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::stock::adjusted_quantity;
use storekeep_core::validation::validate_location;
use storekeep_core::{
    generate_id, CoreError, Inventory, InventoryAction, InventoryHistory, LowStockAlert,
    NotificationKind, Product, StockOutcome,
};
use tracing::{debug, info, warn};

use crate::alerts::{AlertEmail, AlertHandle};
use crate::cache::LowStockCache;
use crate::error::{DbError, DbResult};
use crate::repository::notification;
use crate::repository::select_product;

const INVENTORY_COLUMNS: &str =
    "id, product_id, quantity, location, last_restocked, last_audited, updated_at";

// =============================================================================
// Stock Watch
// =============================================================================

/// Post-commit side effects of stock and catalog writes.
#[derive(Debug, Clone)]
pub struct StockWatch {
    cache: LowStockCache,
    alerts: AlertHandle,
    recipients: Arc<[String]>,
}

impl StockWatch {
    pub(crate) fn new(cache: LowStockCache, alerts: AlertHandle, recipients: Vec<String>) -> Self {
        StockWatch {
            cache,
            alerts,
            recipients: recipients.into(),
        }
    }

    pub(crate) fn cache(&self) -> &LowStockCache {
        &self.cache
    }

    pub(crate) fn alerts(&self) -> &AlertHandle {
        &self.alerts
    }

    /// Runs after a successful commit. Email problems are logged only.
    pub(crate) async fn committed<I>(&self, alerts: I)
    where
        I: IntoIterator<Item = LowStockAlert>,
    {
        self.cache.invalidate().await;

        for alert in alerts {
            if self.recipients.is_empty() {
                continue;
            }
            let email = AlertEmail::low_stock(&alert, &self.recipients);
            if let Err(e) = self.alerts.try_dispatch(email) {
                warn!(
                    product_id = %alert.product_id,
                    error = %e,
                    "Low-stock email not queued"
                );
            }
        }
    }
}

// =============================================================================
// Ledger Primitives (run inside a caller's transaction)
// =============================================================================

/// Result of one inventory write.
#[derive(Debug, Clone)]
pub(crate) struct StockChange {
    pub inventory: Inventory,
    pub alert: Option<LowStockAlert>,
}

/// Locks the product's inventory row and returns it.
async fn claim(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Inventory> {
    let sql = format!(
        "UPDATE inventory SET updated_at = ?2 WHERE product_id = ?1 RETURNING {}",
        INVENTORY_COLUMNS
    );
    sqlx::query_as::<_, Inventory>(&sql)
        .bind(product_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))
}

/// Writes history and, when the new level is low, the notification row.
async fn record(
    conn: &mut SqliteConnection,
    inventory: Inventory,
    old_quantity: i64,
    reason: &str,
    action: InventoryAction,
    actor: Option<&str>,
) -> DbResult<StockChange> {
    let history = sqlx::query_as::<_, InventoryHistory>(
        r#"
        INSERT INTO inventory_history (
            id, inventory_id, old_quantity, new_quantity, difference,
            reason, action, changed_by, changed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id, inventory_id, old_quantity, new_quantity, difference,
                  reason, action, changed_by, changed_at
        "#,
    )
    .bind(generate_id())
    .bind(&inventory.id)
    .bind(old_quantity)
    .bind(inventory.quantity)
    .bind(inventory.quantity - old_quantity)
    .bind(reason)
    .bind(action)
    .bind(actor)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    debug!(history_id = %history.id, difference = history.difference, "History recorded");

    let (name, min_stock_level): (String, i64) =
        sqlx::query_as("SELECT name, min_stock_level FROM products WHERE id = ?1")
            .bind(&inventory.product_id)
            .fetch_one(&mut *conn)
            .await?;

    let alert = LowStockAlert::check(
        &inventory.product_id,
        &name,
        inventory.quantity,
        min_stock_level,
    );
    if let Some(alert) = &alert {
        notification::insert(
            conn,
            NotificationKind::LowStock,
            &alert.title(),
            &alert.message(),
            Some(&alert.product_id),
        )
        .await?;
        info!(
            product_id = %alert.product_id,
            quantity = alert.quantity,
            min = alert.min_stock_level,
            "Low stock"
        );
    }

    Ok(StockChange { inventory, alert })
}

/// Sets an absolute quantity. The single write path for inventory levels.
pub(crate) async fn write_quantity(
    conn: &mut SqliteConnection,
    product_id: &str,
    new_quantity: i64,
    reason: &str,
    action: InventoryAction,
    actor: Option<&str>,
) -> DbResult<StockChange> {
    if new_quantity < 0 {
        return Err(CoreError::InvalidQuantity {
            quantity: new_quantity,
        }
        .into());
    }

    let current = claim(conn, product_id).await?;
    store(conn, current, new_quantity, reason, action, actor).await
}

/// Applies a relative change, floored at zero.
pub(crate) async fn adjust_quantity(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
    reason: &str,
    action: InventoryAction,
    actor: Option<&str>,
) -> DbResult<StockChange> {
    let current = claim(conn, product_id).await?;
    let new_quantity = adjusted_quantity(current.quantity, delta);
    store(conn, current, new_quantity, reason, action, actor).await
}

async fn store(
    conn: &mut SqliteConnection,
    current: Inventory,
    new_quantity: i64,
    reason: &str,
    action: InventoryAction,
    actor: Option<&str>,
) -> DbResult<StockChange> {
    let now = Utc::now();
    let restocked = new_quantity > current.quantity;

    let sql = format!(
        r#"
        UPDATE inventory SET
            quantity = ?2,
            updated_at = ?3,
            last_restocked = CASE WHEN ?4 THEN ?3 ELSE last_restocked END
        WHERE id = ?1
        RETURNING {}
        "#,
        INVENTORY_COLUMNS
    );
    let updated = sqlx::query_as::<_, Inventory>(&sql)
        .bind(&current.id)
        .bind(new_quantity)
        .bind(now)
        .bind(restocked)
        .fetch_one(&mut *conn)
        .await?;

    debug!(
        product_id = %updated.product_id,
        old = current.quantity,
        new = updated.quantity,
        "Inventory written"
    );

    record(conn, updated, current.quantity, reason, action, actor).await
}

/// Takes `quantity` units for a sale if, and only if, enough are on hand.
pub(crate) async fn decrement_for_sale(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
    reason: &str,
    actor: Option<&str>,
) -> DbResult<(StockOutcome, Option<StockChange>)> {
    let sql = format!(
        r#"
        UPDATE inventory SET quantity = quantity - ?2, updated_at = ?3
        WHERE product_id = ?1 AND quantity >= ?2
        RETURNING {}
        "#,
        INVENTORY_COLUMNS
    );
    let updated = sqlx::query_as::<_, Inventory>(&sql)
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

    match updated {
        Some(inventory) => {
            let old = inventory.quantity + quantity;
            let new = inventory.quantity;
            let change = record(conn, inventory, old, reason, InventoryAction::Sale, actor).await?;
            Ok((StockOutcome::Decremented { old, new }, Some(change)))
        }
        None => {
            let available: i64 =
                sqlx::query_scalar("SELECT quantity FROM inventory WHERE product_id = ?1")
                    .bind(product_id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or_else(|| DbError::not_found("Product", product_id))?;
            warn!(
                product_id = %product_id,
                available,
                requested = quantity,
                "Insufficient stock, item recorded without decrement"
            );
            Ok((
                StockOutcome::Insufficient {
                    available,
                    requested: quantity,
                },
                None,
            ))
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
    watch: StockWatch,
}

impl InventoryRepository {
    pub(crate) fn new(pool: SqlitePool, watch: StockWatch) -> Self {
        InventoryRepository { pool, watch }
    }

    pub async fn get(&self, product_id: &str) -> DbResult<Option<Inventory>> {
        let sql = format!(
            "SELECT {} FROM inventory WHERE product_id = ?1",
            INVENTORY_COLUMNS
        );
        let inventory = sqlx::query_as::<_, Inventory>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(inventory)
    }

    /// Sets the quantity to an absolute value.
    ///
    /// ## Returns
    /// * `Err(CoreError::InvalidQuantity)` - `new_quantity < 0`, nothing written
    /// * `Err(DbError::NotFound)` - unknown product
    pub async fn set_quantity(
        &self,
        product_id: &str,
        new_quantity: i64,
        reason: &str,
        action: InventoryAction,
        actor: Option<&str>,
    ) -> DbResult<Inventory> {
        debug!(product_id = %product_id, new_quantity, ?action, "Setting stock");

        let mut tx = self.pool.begin().await?;
        let change = write_quantity(&mut tx, product_id, new_quantity, reason, action, actor).await?;
        tx.commit().await?;

        self.watch.committed(change.alert).await;
        Ok(change.inventory)
    }

    /// Adds `delta` (negative to remove) to the current quantity, flooring
    /// at zero.
    pub async fn adjust(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
        action: InventoryAction,
        actor: Option<&str>,
    ) -> DbResult<Inventory> {
        debug!(product_id = %product_id, delta, ?action, "Adjusting stock");

        let mut tx = self.pool.begin().await?;
        let change = adjust_quantity(&mut tx, product_id, delta, reason, action, actor).await?;
        tx.commit().await?;

        self.watch.committed(change.alert).await;
        Ok(change.inventory)
    }

    /// Records a physical count: sets the quantity and stamps `last_audited`.
    pub async fn record_audit(
        &self,
        product_id: &str,
        counted: i64,
        actor: Option<&str>,
    ) -> DbResult<Inventory> {
        let mut tx = self.pool.begin().await?;
        let change = write_quantity(
            &mut tx,
            product_id,
            counted,
            "Stock audit",
            InventoryAction::Adjustment,
            actor,
        )
        .await?;

        let sql = format!(
            "UPDATE inventory SET last_audited = ?2 WHERE id = ?1 RETURNING {}",
            INVENTORY_COLUMNS
        );
        let inventory = sqlx::query_as::<_, Inventory>(&sql)
            .bind(&change.inventory.id)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        self.watch.committed(change.alert).await;
        Ok(inventory)
    }

    /// Moves stock to a new storage location. No history row.
    pub async fn set_location(&self, product_id: &str, location: &str) -> DbResult<Inventory> {
        validate_location(location)?;

        let sql = format!(
            "UPDATE inventory SET location = ?2, updated_at = ?3 WHERE product_id = ?1 RETURNING {}",
            INVENTORY_COLUMNS
        );
        sqlx::query_as::<_, Inventory>(&sql)
            .bind(product_id)
            .bind(location.trim())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Ledger rows for a product, newest first.
    pub async fn history(&self, product_id: &str) -> DbResult<Vec<InventoryHistory>> {
        let rows = sqlx::query_as::<_, InventoryHistory>(
            r#"
            SELECT h.id, h.inventory_id, h.old_quantity, h.new_quantity, h.difference,
                   h.reason, h.action, h.changed_by, h.changed_at
            FROM inventory_history h
            INNER JOIN inventory i ON i.id = h.inventory_id
            WHERE i.product_id = ?1
            ORDER BY h.changed_at DESC, h.rowid DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Products at or below their minimum level, lowest quantity first.
    pub async fn get_low_stock(&self) -> DbResult<Vec<Product>> {
        let cache = self.watch.cache();
        if let Some(products) = cache.get().await {
            return Ok(products);
        }

        let generation = cache.generation();
        let products = sqlx::query_as::<_, Product>(select_product!(
            "WHERE i.quantity <= p.min_stock_level ORDER BY i.quantity ASC, p.name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Low-stock list queried");
        cache.store(generation, products.clone()).await;
        Ok(products)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_db, test_db_without_cache, test_product};

    #[tokio::test]
    async fn test_set_quantity_writes_one_history_row() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 20, 5).await;

        let inv = db
            .inventory()
            .set_quantity(&product.id, 12, "Recount", InventoryAction::Adjustment, Some("sam"))
            .await
            .unwrap();
        assert_eq!(inv.quantity, 12);

        let history = db.inventory().history(&product.id).await.unwrap();
        // restock to 20 from the helper, then the recount
        assert_eq!(history.len(), 2);
        let latest = &history[0];
        assert_eq!(latest.old_quantity, 20);
        assert_eq!(latest.new_quantity, 12);
        assert_eq!(latest.difference, -8);
        assert_eq!(latest.action, InventoryAction::Adjustment);
        assert_eq!(latest.changed_by.as_deref(), Some("sam"));
    }

    #[tokio::test]
    async fn test_negative_quantity_rejected_without_writes() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 20, 5).await;

        let err = db
            .inventory()
            .set_quantity(&product.id, -1, "oops", InventoryAction::Adjustment, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidQuantity { quantity: -1 })
        ));

        assert_eq!(db.inventory().history(&product.id).await.unwrap().len(), 1);
        assert_eq!(db.inventory().get(&product.id).await.unwrap().unwrap().quantity, 20);
    }

    #[tokio::test]
    async fn test_unknown_product_not_found() {
        let db = test_db().await;
        let err = db
            .inventory()
            .set_quantity("missing", 3, "x", InventoryAction::Restock, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_adjust_floors_at_zero() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 3, 1).await;

        let inv = db
            .inventory()
            .adjust(&product.id, -10, "Damaged crate", InventoryAction::Damage, None)
            .await
            .unwrap();
        assert_eq!(inv.quantity, 0);

        let history = db.inventory().history(&product.id).await.unwrap();
        assert_eq!(history[0].difference, -3);
    }

    #[tokio::test]
    async fn test_low_stock_creates_notification() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 20, 5).await;
        assert!(db.notifications().list(true).await.unwrap().is_empty());

        db.inventory()
            .set_quantity(&product.id, 5, "Sold", InventoryAction::Sale, None)
            .await
            .unwrap();

        let notes = db.notifications().list(true).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::LowStock);
        assert_eq!(notes[0].title, "Low Stock Alert: TEA-250");
        assert_eq!(notes[0].message, "Only 5 left in stock. Minimum is 5.");
        assert_eq!(notes[0].related_id.as_deref(), Some(product.id.as_str()));
    }

    #[tokio::test]
    async fn test_low_stock_list_tracks_writes() {
        for db in [test_db().await, test_db_without_cache().await] {
            let tea = test_product(&db, "TEA-250", 1000, 20, 5).await;
            let rice = test_product(&db, "RICE-1KG", 500, 2, 5).await;

            let low = db.inventory().get_low_stock().await.unwrap();
            assert_eq!(low.len(), 1);
            assert_eq!(low[0].id, rice.id);

            db.inventory()
                .set_quantity(&tea.id, 1, "Sold", InventoryAction::Sale, None)
                .await
                .unwrap();

            let low = db.inventory().get_low_stock().await.unwrap();
            assert_eq!(
                low.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
                vec![tea.id.as_str(), rice.id.as_str()]
            );
            assert_eq!(low[0].current_stock, 1);
        }
    }

    #[tokio::test]
    async fn test_location_and_audit() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 20, 5).await;

        let inv = db.inventory().set_location(&product.id, "Aisle 4").await.unwrap();
        assert_eq!(inv.location, "Aisle 4");
        assert_eq!(db.inventory().history(&product.id).await.unwrap().len(), 1);

        let inv = db.inventory().record_audit(&product.id, 18, None).await.unwrap();
        assert_eq!(inv.quantity, 18);
        assert!(inv.last_audited.is_some());
    }

    #[tokio::test]
    async fn test_history_rows_are_append_only() {
        let db = test_db().await;
        let product = test_product(&db, "TEA-250", 1000, 20, 5).await;

        let result = sqlx::query("UPDATE inventory_history SET reason = 'edited'")
            .execute(db.pool())
            .await;
        assert!(matches!(
            result.map_err(DbError::from),
            Err(DbError::ConstraintViolation(_))
        ));
        let _ = product;
    }
}
