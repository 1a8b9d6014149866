//! # Return/Refund Processor
//!
//! ```text
//! create ──► pending ──approve──► approved ──process──► processed
//!               │                                │
//!               └──reject──► rejected            ├── inventory +quantity ("Return")
//!                                                └── balance −refund_amount
//! ```
//!
//! Only `process` touches stock or money, and it does both in one
//! transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::returns::{default_refund, ensure_status, refund_memo, returnable_quantity};
use storekeep_core::validation::{validate_non_negative, validate_quantity};
use storekeep_core::{
    generate_id, CoreError, InventoryAction, Money, ProductReturn, ReturnReason, ReturnStatus,
    TransactionKind,
};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::customer::{apply_balance, BalanceEntry};
use crate::repository::inventory::{adjust_quantity, StockWatch};
use crate::repository::order::claim_order;

const RETURN_COLUMNS: &str = "id, order_id, product_id, quantity, reason, notes, status, \
     refund_amount_cents, created_by, processed_by, created_at, processed_at";

/// Locks the return row and returns it.
async fn claim(conn: &mut SqliteConnection, return_id: &str) -> DbResult<ProductReturn> {
    let sql = format!(
        "UPDATE returns SET status = status WHERE id = ?1 RETURNING {}",
        RETURN_COLUMNS
    );
    sqlx::query_as::<_, ProductReturn>(&sql)
        .bind(return_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Return", return_id))
}

#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
    watch: StockWatch,
}

impl ReturnRepository {
    pub(crate) fn new(pool: SqlitePool, watch: StockWatch) -> Self {
        ReturnRepository { pool, watch }
    }

    /// Opens a pending return for a product on the order.
    ///
    /// ## Returns
    /// * `Err(CoreError::ReturnQuantityExceeded)` - more than was ordered,
    ///   counting earlier returns that were not rejected
    /// * `Err(DbError::NotFound)` - unknown order, or product not on it
    pub async fn create(
        &self,
        order_id: &str,
        product_id: &str,
        quantity: i64,
        reason: ReturnReason,
        notes: Option<&str>,
        actor: Option<&str>,
    ) -> DbResult<ProductReturn> {
        validate_quantity(quantity)?;
        debug!(order_id = %order_id, product_id = %product_id, quantity, "Creating return");

        let mut tx = self.pool.begin().await?;
        claim_order(&mut tx, order_id).await?;

        let (lines, ordered): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(quantity), 0) FROM order_items \
             WHERE order_id = ?1 AND product_id = ?2",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        if lines == 0 {
            return Err(DbError::not_found("OrderItem", product_id));
        }

        let already: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM returns \
             WHERE order_id = ?1 AND product_id = ?2 AND status <> 'rejected'",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let returnable = returnable_quantity(ordered, already);
        if quantity > returnable {
            let sku: String = sqlx::query_scalar("SELECT sku FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(CoreError::ReturnQuantityExceeded {
                sku,
                returnable,
                requested: quantity,
            }
            .into());
        }

        let sql = format!(
            r#"
            INSERT INTO returns (
                id, order_id, product_id, quantity, reason, notes, status,
                refund_amount_cents, created_by, processed_by, created_at, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, NULL, ?9, NULL)
            RETURNING {}
            "#,
            RETURN_COLUMNS
        );
        let ret = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(generate_id())
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .bind(reason)
            .bind(notes)
            .bind(ReturnStatus::Pending)
            .bind(actor)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(return_id = %ret.id, order_id = %order_id, reason = ?reason, "Return created");
        Ok(ret)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ProductReturn>> {
        let sql = format!("SELECT {} FROM returns WHERE id = ?1", RETURN_COLUMNS);
        let ret = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ret)
    }

    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<ProductReturn>> {
        let sql = format!(
            "SELECT {} FROM returns WHERE order_id = ?1 ORDER BY created_at, rowid",
            RETURN_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// pending → approved. Without an explicit amount the refund is the
    /// ordered unit price times the returned quantity.
    pub async fn approve(
        &self,
        return_id: &str,
        refund_amount: Option<Money>,
        actor: Option<&str>,
    ) -> DbResult<ProductReturn> {
        if let Some(amount) = refund_amount {
            validate_non_negative("refund_amount", amount.cents())?;
        }

        let mut tx = self.pool.begin().await?;
        let ret = claim(&mut tx, return_id).await?;
        ensure_status(&ret, ReturnStatus::Pending)?;

        let refund = match refund_amount {
            Some(amount) => amount,
            None => {
                let price: i64 = sqlx::query_scalar(
                    "SELECT price_cents FROM order_items WHERE order_id = ?1 AND product_id = ?2 \
                     ORDER BY created_at, rowid LIMIT 1",
                )
                .bind(&ret.order_id)
                .bind(&ret.product_id)
                .fetch_one(&mut *tx)
                .await?;
                default_refund(Money::from_cents(price), ret.quantity)
            }
        };

        let sql = format!(
            "UPDATE returns SET status = ?2, refund_amount_cents = ?3, processed_by = ?4 \
             WHERE id = ?1 RETURNING {}",
            RETURN_COLUMNS
        );
        let approved = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(return_id)
            .bind(ReturnStatus::Approved)
            .bind(refund.cents())
            .bind(actor)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(return_id = %return_id, refund = %refund, "Return approved");
        Ok(approved)
    }

    /// pending → rejected.
    pub async fn reject(&self, return_id: &str, actor: Option<&str>) -> DbResult<ProductReturn> {
        let mut tx = self.pool.begin().await?;
        let ret = claim(&mut tx, return_id).await?;
        ensure_status(&ret, ReturnStatus::Pending)?;

        let sql = format!(
            "UPDATE returns SET status = ?2, processed_by = ?3, processed_at = ?4 \
             WHERE id = ?1 RETURNING {}",
            RETURN_COLUMNS
        );
        let rejected = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(return_id)
            .bind(ReturnStatus::Rejected)
            .bind(actor)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(return_id = %return_id, "Return rejected");
        Ok(rejected)
    }

    /// approved → processed: puts the stock back and credits the refund.
    pub async fn process(&self, return_id: &str, actor: Option<&str>) -> DbResult<ProductReturn> {
        let mut tx = self.pool.begin().await?;
        let ret = claim(&mut tx, return_id).await?;
        ensure_status(&ret, ReturnStatus::Approved)?;

        let order = claim_order(&mut tx, &ret.order_id).await?;

        let change = adjust_quantity(
            &mut tx,
            &ret.product_id,
            ret.quantity,
            "Return",
            InventoryAction::Return,
            actor,
        )
        .await?;

        let refund = ret.refund_amount().unwrap_or_default();
        if refund.is_positive() {
            let memo = refund_memo(&order.order_number);
            apply_balance(
                &mut tx,
                &order.customer_id,
                BalanceEntry {
                    amount: -refund,
                    description: &memo,
                    kind: TransactionKind::Refund,
                    order_id: Some(&order.id),
                    actor,
                },
            )
            .await?;
        }

        let sql = format!(
            "UPDATE returns SET status = ?2, processed_by = ?3, processed_at = ?4 \
             WHERE id = ?1 RETURNING {}",
            RETURN_COLUMNS
        );
        let processed = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(return_id)
            .bind(ReturnStatus::Processed)
            .bind(actor)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        self.watch.committed(change.alert).await;

        info!(
            return_id = %return_id,
            order_number = %order.order_number,
            quantity = ret.quantity,
            refund = %refund,
            "Return processed"
        );
        Ok(processed)
    }
}
