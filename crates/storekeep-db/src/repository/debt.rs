//! # Debt Tracker
//!
//! One debt per unpaid order, opened at checkout. `remaining_amount` only
//! ever goes down (a trigger rejects any increase) and `is_settled` is
//! rewritten with it on every change.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::debt::{accepts_payment, due_date, settle};
use storekeep_core::{generate_id, Debt, Money, Order, PaymentMethod};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::StockWatch;
use crate::repository::order::{claim_order, post_payment, PaymentInput, PaymentOutcome};

pub(crate) const DEBT_COLUMNS: &str = "id, customer_id, order_id, initial_amount_cents, \
     remaining_amount_cents, due_date, is_settled, created_at, updated_at";

/// Opens the debt for a freshly created order.
pub(crate) async fn open_debt(
    conn: &mut SqliteConnection,
    order: &Order,
    term_days: i64,
) -> DbResult<Debt> {
    let now = Utc::now();
    let amount = order.total();

    let sql = format!(
        r#"
        INSERT INTO debts (
            id, customer_id, order_id, initial_amount_cents, remaining_amount_cents,
            due_date, is_settled, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?7)
        RETURNING {}
        "#,
        DEBT_COLUMNS
    );
    let debt = sqlx::query_as::<_, Debt>(&sql)
        .bind(generate_id())
        .bind(&order.customer_id)
        .bind(&order.id)
        .bind(amount.cents())
        .bind(due_date(now, term_days))
        .bind(amount <= Money::zero())
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

    info!(
        order_number = %order.order_number,
        amount = %amount,
        due = %debt.due_date,
        "Debt opened"
    );
    Ok(debt)
}

/// Lowers the order's open debt by `amount`, flooring at zero.
///
/// Returns `None` when the order has no open debt.
pub(crate) async fn reduce_for_order(
    conn: &mut SqliteConnection,
    order_id: &str,
    amount: Money,
) -> DbResult<Option<Debt>> {
    let sql = format!(
        "SELECT {} FROM debts WHERE order_id = ?1 AND is_settled = 0",
        DEBT_COLUMNS
    );
    let Some(debt) = sqlx::query_as::<_, Debt>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let settlement = settle(debt.remaining_amount(), amount);

    let sql = format!(
        r#"
        UPDATE debts SET remaining_amount_cents = ?2, is_settled = ?3, updated_at = ?4
        WHERE id = ?1
        RETURNING {}
        "#,
        DEBT_COLUMNS
    );
    let updated = sqlx::query_as::<_, Debt>(&sql)
        .bind(&debt.id)
        .bind(settlement.remaining.cents())
        .bind(settlement.is_settled)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

    debug!(
        debt_id = %updated.id,
        old = debt.remaining_amount_cents,
        new = updated.remaining_amount_cents,
        settled = updated.is_settled,
        "Debt reduced"
    );
    Ok(Some(updated))
}

#[derive(Debug, Clone)]
pub struct DebtRepository {
    pool: SqlitePool,
    watch: StockWatch,
}

impl DebtRepository {
    pub(crate) fn new(pool: SqlitePool, watch: StockWatch) -> Self {
        DebtRepository { pool, watch }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Debt>> {
        let sql = format!("SELECT {} FROM debts WHERE id = ?1", DEBT_COLUMNS);
        let debt = sqlx::query_as::<_, Debt>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(debt)
    }

    pub async fn get_for_order(&self, order_id: &str) -> DbResult<Option<Debt>> {
        let sql = format!("SELECT {} FROM debts WHERE order_id = ?1", DEBT_COLUMNS);
        let debt = sqlx::query_as::<_, Debt>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(debt)
    }

    /// Unsettled debts, earliest due first. All customers when `None`.
    pub async fn list_outstanding(&self, customer_id: Option<&str>) -> DbResult<Vec<Debt>> {
        let sql = format!(
            "SELECT {} FROM debts WHERE is_settled = 0 AND (?1 IS NULL OR customer_id = ?1) \
             ORDER BY due_date ASC",
            DEBT_COLUMNS
        );
        let debts = sqlx::query_as::<_, Debt>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(debts)
    }

    /// Unsettled debts whose due date is before `now`.
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> DbResult<Vec<Debt>> {
        let debts = self.list_outstanding(None).await?;
        Ok(debts.into_iter().filter(|d| d.is_overdue(now)).collect())
    }

    /// Pays toward a debt through its order.
    ///
    /// ## Returns
    /// * `Ok(None)` - `amount <= 0` or the debt is already settled
    /// * `Ok(Some(outcome))` - payment posted, balance and debt updated;
    ///   stock taken if the payment confirmed the order
    pub async fn add_payment(
        &self,
        debt_id: &str,
        amount: Money,
        method: PaymentMethod,
        reference: Option<&str>,
        actor: Option<&str>,
    ) -> DbResult<Option<PaymentOutcome>> {
        let mut tx = self.pool.begin().await?;

        // claim first so the whole read-modify-write holds the write lock
        let sql = format!(
            "UPDATE debts SET updated_at = ?2 WHERE id = ?1 RETURNING {}",
            DEBT_COLUMNS
        );
        let debt = sqlx::query_as::<_, Debt>(&sql)
            .bind(debt_id)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Debt", debt_id))?;

        if !accepts_payment(&debt, amount) {
            warn!(debt_id = %debt_id, amount = %amount, settled = debt.is_settled, "Debt payment declined");
            return Ok(None);
        }

        let order = claim_order(&mut tx, &debt.order_id).await?;
        let (outcome, alerts) = post_payment(
            &mut tx,
            &order,
            PaymentInput {
                amount,
                method,
                reference,
                actor,
            },
        )
        .await?;
        tx.commit().await?;
        self.watch.committed(alerts).await;

        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{checkout_order, test_db};
    use chrono::Duration;
    use storekeep_core::{OrderStatus, StockOutcome};

    #[tokio::test]
    async fn test_payment_reduces_remaining_monotonically() {
        let db = test_db().await;
        let checkout = checkout_order(&db, 20_000).await;
        let debt = checkout.debt.unwrap();

        let mut last = debt.remaining_amount();
        for units in [50, 30, 200] {
            db.debts()
                .add_payment(&debt.id, Money::from_units(units), PaymentMethod::Cash, None, None)
                .await
                .unwrap()
                .unwrap();
            let current = db.debts().get(&debt.id).await.unwrap().unwrap();
            assert!(current.remaining_amount() <= last);
            last = current.remaining_amount();
        }

        let settled = db.debts().get(&debt.id).await.unwrap().unwrap();
        assert_eq!(settled.remaining_amount(), Money::zero());
        assert!(settled.is_settled);
    }

    #[tokio::test]
    async fn test_settled_and_non_positive_declined() {
        let db = test_db().await;
        let checkout = checkout_order(&db, 5_000).await;
        let debt = checkout.debt.unwrap();

        assert!(db
            .debts()
            .add_payment(&debt.id, Money::zero(), PaymentMethod::Cash, None, None)
            .await
            .unwrap()
            .is_none());

        db.debts()
            .add_payment(&debt.id, Money::from_units(50), PaymentMethod::Cash, None, None)
            .await
            .unwrap()
            .unwrap();

        assert!(db
            .debts()
            .add_payment(&debt.id, Money::from_units(10), PaymentMethod::Cash, None, None)
            .await
            .unwrap()
            .is_none());
        assert_eq!(db.orders().payments(&checkout.order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settling_payment_takes_order_stock() {
        let db = test_db().await;
        let checkout = checkout_order(&db, 5_000).await;
        let debt = checkout.debt.unwrap();
        let product_id = &checkout.items[0].product_id;

        let outcome = db
            .debts()
            .add_payment(&debt.id, Money::from_units(50), PaymentMethod::Bank, None, Some("till-2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Confirmed);
        assert_eq!(outcome.stock.len(), 1);
        assert_eq!(outcome.stock[0].stock, StockOutcome::Decremented { old: 50, new: 49 });
        assert_eq!(db.inventory().get(product_id).await.unwrap().unwrap().quantity, 49);
    }

    #[tokio::test]
    async fn test_remaining_cannot_be_raised_directly() {
        let db = test_db().await;
        let checkout = checkout_order(&db, 5_000).await;

        let result = sqlx::query("UPDATE debts SET remaining_amount_cents = remaining_amount_cents + 1")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(result, Err(DbError::ConstraintViolation(_))));
        let _ = checkout;
    }

    #[tokio::test]
    async fn test_outstanding_and_overdue() {
        let db = test_db().await;
        let first = checkout_order(&db, 5_000).await;
        let second = checkout_order(&db, 7_000).await;

        let outstanding = db.debts().list_outstanding(None).await.unwrap();
        assert_eq!(outstanding.len(), 2);

        let mine = db
            .debts()
            .list_outstanding(Some(&first.order.customer_id))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        assert!(db.debts().list_overdue(Utc::now()).await.unwrap().is_empty());
        let later = Utc::now() + Duration::days(31);
        assert_eq!(db.debts().list_overdue(later).await.unwrap().len(), 2);

        let found = db.debts().get_for_order(&second.order.id).await.unwrap().unwrap();
        assert_eq!(found.initial_amount_cents, 7_000);
    }
}
