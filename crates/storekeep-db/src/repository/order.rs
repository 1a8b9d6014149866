//! # Order & Payment Engine
//!
//! ## Payment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_payment(order, amount)        amount <= 0 → None, nothing written  │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── claim order row                                                   │
//! │   ├── INSERT payments (+amount)                                         │
//! │   ├── balance ledger: −amount  "Payment for order #<number>"            │
//! │   ├── payment_status = derive(Σ payments, total)                        │
//! │   │      paid and pending → status confirmed                            │
//! │   │        └── every order line takes stock (StockOutcome per line)     │
//! │   └── open debt: remaining = max(0, remaining − amount)                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Refunds are negative payments linked to the payment they hand back. They
//! credit the balance and re-derive the payment status but never reopen a
//! debt. A payment can be refunded in parts, never beyond its amount.
//!
//! Stock leaves the shelf when an order first moves past pending, whether by
//! full payment or by [`OrderRepository::update_status`].

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::discount::evaluate;
use storekeep_core::payment::{
    derive_payment_status, payment_memo, refund_memo, refund_reference, refundable,
    status_after_payment,
};
use storekeep_core::stock::sale_reason;
use storekeep_core::validation::{validate_discount_code, validate_quantity};
use storekeep_core::{
    generate_id, CoreError, Discount, LowStockAlert, Money, Order, OrderItem, OrderStatus,
    Payment, PaymentMethod, Receipt, ReceiptLine, StockOutcome, TransactionKind,
};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::customer::{apply_balance, BalanceEntry};
use crate::repository::debt::reduce_for_order;
use crate::repository::discount::DISCOUNT_COLUMNS;
use crate::repository::inventory::{decrement_for_sale, StockWatch};

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, payment_status, \
     subtotal_cents, tax_cents, discount_cents, total_cents, discount_code, notes, \
     created_at, updated_at";

pub(crate) const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, product_id, quantity, price_cents, created_at";

const PAYMENT_COLUMNS: &str =
    "id, order_id, amount_cents, method, reference, refund_of, processed_by, created_at";

/// An order line and what happened to its stock.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItemOutcome {
    pub item: OrderItem,
    pub stock: StockOutcome,
}

/// A posted payment and the order it left behind.
///
/// `stock` has one entry per order line when the payment confirmed the
/// order, and is empty otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub order: Order,
    pub stock: Vec<OrderItemOutcome>,
}

/// Result of [`OrderRepository::update_status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub order: Order,
    /// One entry per order line when the change took stock.
    pub stock: Vec<OrderItemOutcome>,
}

/// A positive payment to post.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PaymentInput<'a> {
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<&'a str>,
    pub actor: Option<&'a str>,
}

/// Locks the order row and returns it.
pub(crate) async fn claim_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Order> {
    let sql = format!(
        "UPDATE orders SET updated_at = ?2 WHERE id = ?1 RETURNING {}",
        ORDER_COLUMNS
    );
    sqlx::query_as::<_, Order>(&sql)
        .bind(order_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_id))
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    order_id: &str,
    amount: Money,
    method: PaymentMethod,
    reference: Option<&str>,
    refund_of: Option<&str>,
    actor: Option<&str>,
) -> DbResult<Payment> {
    let sql = format!(
        r#"
        INSERT INTO payments (
            id, order_id, amount_cents, method, reference, refund_of, processed_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING {}
        "#,
        PAYMENT_COLUMNS
    );
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(generate_id())
        .bind(order_id)
        .bind(amount.cents())
        .bind(method)
        .bind(reference)
        .bind(refund_of)
        .bind(actor)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
    Ok(payment)
}

async fn amount_paid(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Money> {
    let cents: i64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE order_id = ?1")
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(Money::from_cents(cents))
}

/// Re-derives `payment_status` from the payments on file. Returns the
/// updated order.
async fn refresh_payment_status(
    conn: &mut SqliteConnection,
    order: &Order,
    auto_confirm: bool,
) -> DbResult<Order> {
    let paid = amount_paid(conn, &order.id).await?;
    let payment_status = derive_payment_status(paid, order.total());
    let status = if auto_confirm {
        status_after_payment(order.status, payment_status)
    } else {
        order.status
    };

    let sql = format!(
        "UPDATE orders SET payment_status = ?2, status = ?3, updated_at = ?4 WHERE id = ?1 RETURNING {}",
        ORDER_COLUMNS
    );
    let updated = sqlx::query_as::<_, Order>(&sql)
        .bind(&order.id)
        .bind(payment_status)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

    if updated.status != order.status {
        info!(
            order_number = %order.order_number,
            from = ?order.status,
            to = ?updated.status,
            "Order confirmed by payment"
        );
    }
    Ok(updated)
}

/// Takes stock for every line of an order that is leaving pending.
///
/// Shortfalls are reported per line and leave that product untouched.
async fn take_order_stock(
    conn: &mut SqliteConnection,
    order: &Order,
    actor: Option<&str>,
) -> DbResult<(Vec<OrderItemOutcome>, Vec<LowStockAlert>)> {
    let sql = format!(
        "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY created_at, rowid",
        ORDER_ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, OrderItem>(&sql)
        .bind(&order.id)
        .fetch_all(&mut *conn)
        .await?;

    let reason = sale_reason(&order.order_number);
    let mut outcomes = Vec::with_capacity(items.len());
    let mut alerts = Vec::new();

    for item in items {
        let (stock, change) =
            decrement_for_sale(conn, &item.product_id, item.quantity, &reason, actor).await?;
        alerts.extend(change.and_then(|change| change.alert));
        outcomes.push(OrderItemOutcome { item, stock });
    }

    let short = outcomes.iter().filter(|o| o.stock.is_insufficient()).count();
    if short > 0 {
        warn!(
            order_number = %order.order_number,
            lines = outcomes.len(),
            short,
            "Order stock taken with shortfalls"
        );
    } else {
        info!(order_number = %order.order_number, lines = outcomes.len(), "Order stock taken");
    }
    Ok((outcomes, alerts))
}

/// Posts a payment against a claimed order. `input.amount` must be positive.
///
/// Returns the low-stock alerts to hand to [`StockWatch::committed`] once the
/// caller commits.
pub(crate) async fn post_payment(
    conn: &mut SqliteConnection,
    order: &Order,
    input: PaymentInput<'_>,
) -> DbResult<(PaymentOutcome, Vec<LowStockAlert>)> {
    let payment = insert_payment(
        conn,
        &order.id,
        input.amount,
        input.method,
        input.reference,
        None,
        input.actor,
    )
    .await?;

    let memo = payment_memo(&order.order_number);
    apply_balance(
        conn,
        &order.customer_id,
        BalanceEntry {
            amount: -input.amount,
            description: &memo,
            kind: TransactionKind::Payment,
            order_id: Some(&order.id),
            actor: input.actor,
        },
    )
    .await?;

    let updated = refresh_payment_status(conn, order, true).await?;
    reduce_for_order(conn, &order.id, input.amount).await?;

    let (stock, alerts) = if order.status.commits_stock(updated.status) {
        take_order_stock(conn, &updated, input.actor).await?
    } else {
        (Vec::new(), Vec::new())
    };

    info!(
        order_number = %order.order_number,
        amount = %input.amount,
        method = ?input.method,
        payment_status = ?updated.payment_status,
        "Payment recorded"
    );
    Ok((
        PaymentOutcome {
            payment,
            order: updated,
            stock,
        },
        alerts,
    ))
}

/// Repository for orders, their payments and receipts.
///
/// ## Usage
/// ```rust,ignore
/// let orders = db.orders();
///
/// let paid = orders.add_payment(&order.id, Money::from_units(200), PaymentMethod::Cash, None, None).await?;
/// let receipt = orders.generate_receipt(&order.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    watch: StockWatch,
}

impl OrderRepository {
    pub(crate) fn new(pool: SqlitePool, watch: StockWatch) -> Self {
        OrderRepository { pool, watch }
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY created_at, rowid",
            ORDER_ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    /// Payments and refunds, oldest first.
    pub async fn payments(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE order_id = ?1 ORDER BY created_at, rowid",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(payments)
    }

    /// Newest first.
    pub async fn list_by_customer(&self, customer_id: &str) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE customer_id = ?1 ORDER BY created_at DESC, rowid DESC",
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    /// Records a payment against an order.
    ///
    /// ## Returns
    /// * `Ok(None)` - `amount <= 0`; nothing written
    /// * `Ok(Some(outcome))` - payment, balance entry, status and debt
    ///   updated; stock taken if the payment confirmed the order
    /// * `Err(DbError::NotFound)` - unknown order
    pub async fn add_payment(
        &self,
        order_id: &str,
        amount: Money,
        method: PaymentMethod,
        reference: Option<&str>,
        actor: Option<&str>,
    ) -> DbResult<Option<PaymentOutcome>> {
        if !amount.is_positive() {
            warn!(order_id = %order_id, amount = %amount, "Non-positive payment declined");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;
        let order = claim_order(&mut tx, order_id).await?;
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

    /// Refunds part or all of an earlier payment.
    ///
    /// Posts a negative payment with the original method, credits the
    /// customer's balance and re-derives the payment status. The debt is
    /// left as it is.
    ///
    /// ## Returns
    /// * `Ok(None)` - `amount <= 0`, the target is itself a refund, or
    ///   `amount` exceeds what is left of the original payment after its
    ///   earlier refunds, or the order's net paid amount
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Money,
        actor: Option<&str>,
    ) -> DbResult<Option<Payment>> {
        if !amount.is_positive() {
            warn!(payment_id = %payment_id, amount = %amount, "Non-positive refund declined");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE orders SET updated_at = ?2 \
             WHERE id = (SELECT order_id FROM payments WHERE id = ?1) RETURNING {}",
            ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(payment_id)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

        let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
        let original = sqlx::query_as::<_, Payment>(&sql)
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await?;

        if !original.amount().is_positive() {
            warn!(payment_id = %payment_id, "Refund of a refund declined");
            return Ok(None);
        }

        let refunded_cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(-SUM(amount_cents), 0) FROM payments WHERE refund_of = ?1",
        )
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;
        let remaining = refundable(original.amount(), Money::from_cents(refunded_cents));
        if amount > remaining {
            warn!(
                payment_id = %payment_id,
                original = %original.amount(),
                refundable = %remaining,
                amount = %amount,
                "Refund declined"
            );
            return Ok(None);
        }

        let paid = amount_paid(&mut tx, &order.id).await?;
        if amount > paid {
            warn!(order_number = %order.order_number, paid = %paid, amount = %amount, "Refund exceeds net paid");
            return Ok(None);
        }

        let reference = refund_reference(original.reference.as_deref());
        let refund = insert_payment(
            &mut tx,
            &order.id,
            -amount,
            original.method,
            Some(&reference),
            Some(&original.id),
            actor,
        )
        .await?;

        let memo = refund_memo(&order.order_number);
        apply_balance(
            &mut tx,
            &order.customer_id,
            BalanceEntry {
                amount,
                description: &memo,
                kind: TransactionKind::Refund,
                order_id: Some(&order.id),
                actor,
            },
        )
        .await?;

        let updated = refresh_payment_status(&mut tx, &order, false).await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            amount = %amount,
            payment_status = ?updated.payment_status,
            "Payment refunded"
        );
        Ok(Some(refund))
    }

    // -------------------------------------------------------------------------
    // Status, discounts, items
    // -------------------------------------------------------------------------

    /// Moves the order to `status`. Setting the current status is a no-op.
    ///
    /// Leaving pending for a fulfilment state takes stock for every line.
    pub async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        actor: Option<&str>,
    ) -> DbResult<StatusChange> {
        let mut tx = self.pool.begin().await?;
        let order = claim_order(&mut tx, order_id).await?;

        if order.status == status {
            tx.commit().await?;
            return Ok(StatusChange {
                order,
                stock: Vec::new(),
            });
        }
        if !order.status.can_transition_to(status) {
            return Err(CoreError::InvalidStatusTransition {
                order_number: order.order_number,
                from: order.status,
                to: status,
            }
            .into());
        }

        let sql = format!(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 RETURNING {}",
            ORDER_COLUMNS
        );
        let updated = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .bind(status)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        let (stock, alerts) = if order.status.commits_stock(status) {
            take_order_stock(&mut tx, &updated, actor).await?
        } else {
            (Vec::new(), Vec::new())
        };
        tx.commit().await?;
        self.watch.committed(alerts).await;

        info!(
            order_number = %updated.order_number,
            from = ?order.status,
            to = ?updated.status,
            "Order status changed"
        );
        Ok(StatusChange {
            order: updated,
            stock,
        })
    }

    /// Applies a discount code and returns the amount taken off.
    ///
    /// The order total becomes `subtotal + tax − discount` and the open debt
    /// shrinks by the same amount. Payment status is not re-derived.
    pub async fn apply_discount(&self, order_id: &str, code: &str) -> DbResult<Money> {
        validate_discount_code(code)?;
        let code = code.trim();

        let mut tx = self.pool.begin().await?;
        let order = claim_order(&mut tx, order_id).await?;

        if order.discount_code.is_some() {
            return Err(CoreError::DiscountRejected {
                code: code.to_string(),
                reason: "order already has a discount".to_string(),
            }
            .into());
        }

        let sql = format!("SELECT {} FROM discounts WHERE code = ?1", DISCOUNT_COLUMNS);
        let discount = sqlx::query_as::<_, Discount>(&sql)
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Discount", code))?;

        let amount = evaluate(&discount, order.subtotal(), Utc::now())
            .map_err(|rejection| rejection.into_core(code))?;

        let claimed = sqlx::query(
            "UPDATE discounts SET times_used = times_used + 1 \
             WHERE id = ?1 AND (usage_limit IS NULL OR times_used < usage_limit)",
        )
        .bind(&discount.id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(CoreError::DiscountRejected {
                code: code.to_string(),
                reason: "usage limit reached".to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE orders SET
                discount_cents = ?2,
                total_cents = subtotal_cents + tax_cents - ?2,
                discount_code = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(order_id)
        .bind(amount.cents())
        .bind(&discount.code)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        reduce_for_order(&mut tx, order_id, amount).await?;
        tx.commit().await?;

        info!(order_number = %order.order_number, code = %code, amount = %amount, "Discount applied");
        Ok(amount)
    }

    /// Adds a line to an existing order at the product's current price.
    ///
    /// Confirmed and processing orders take stock immediately. A shortfall
    /// is reported in the outcome and the line is still recorded. Order
    /// totals are not changed.
    pub async fn add_item(
        &self,
        order_id: &str,
        product_id: &str,
        quantity: i64,
        actor: Option<&str>,
    ) -> DbResult<OrderItemOutcome> {
        validate_quantity(quantity)?;
        debug!(order_id = %order_id, product_id = %product_id, quantity, "Adding order item");

        let mut tx = self.pool.begin().await?;
        let order = claim_order(&mut tx, order_id).await?;

        let price_cents: i64 = sqlx::query_scalar("SELECT price_cents FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        let sql = format!(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {}
            "#,
            ORDER_ITEM_COLUMNS
        );
        let item = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(generate_id())
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .bind(price_cents)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        let (stock, change) = if order.status.takes_stock() {
            let reason = sale_reason(&order.order_number);
            decrement_for_sale(&mut tx, product_id, quantity, &reason, actor).await?
        } else {
            (StockOutcome::NotRequired, None)
        };

        tx.commit().await?;
        self.watch
            .committed(change.and_then(|change| change.alert))
            .await;

        Ok(OrderItemOutcome { item, stock })
    }

    // -------------------------------------------------------------------------
    // Receipts
    // -------------------------------------------------------------------------

    /// Read-only receipt projection of an order.
    pub async fn generate_receipt(&self, order_id: &str) -> DbResult<Receipt> {
        let order = self
            .get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        let customer: String = sqlx::query_scalar("SELECT name FROM customers WHERE id = ?1")
            .bind(&order.customer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", &order.customer_id))?;

        let lines: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT p.name, oi.quantity, oi.price_cents
            FROM order_items oi
            INNER JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ?1
            ORDER BY oi.created_at, oi.rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let items = lines
            .into_iter()
            .map(|(name, quantity, price)| ReceiptLine::new(name, quantity, Money::from_cents(price)))
            .collect();

        let payments = self.payments(order_id).await?;
        Ok(Receipt::build(&order, customer, items, &payments))
    }
}
