//! # Balance Ledger
//!
//! A customer's `balance_cents` changes only through [`apply_balance`],
//! which updates the balance and writes the matching
//! [`BalanceTransaction`] in the caller's transaction.
//!
//! ```text
//! UPDATE customers SET balance = balance + amount ... RETURNING balance
//!      │                        (claims the row, new balance known)
//!      ▼
//! INSERT balance_transactions (old = new − amount, amount, new)
//! ```
//!
//! Positive balance means the customer owes the store. Payments post
//! negative amounts, refunds positive ones.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use storekeep_core::validation::{validate_new_customer, validate_non_negative};
use storekeep_core::{generate_id, BalanceTransaction, Customer, Money, NewCustomer, TransactionKind};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, address, balance_cents, \
     credit_limit_cents, is_approved, active_cart_id, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, customer_id, amount_cents, old_balance_cents, \
     new_balance_cents, description, kind, order_id, processed_by, created_at";

/// One balance ledger entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BalanceEntry<'a> {
    pub amount: Money,
    pub description: &'a str,
    pub kind: TransactionKind,
    pub order_id: Option<&'a str>,
    pub actor: Option<&'a str>,
}

/// Applies `entry.amount` to the balance and records the snapshot row.
pub(crate) async fn apply_balance(
    conn: &mut SqliteConnection,
    customer_id: &str,
    entry: BalanceEntry<'_>,
) -> DbResult<BalanceTransaction> {
    let now = Utc::now();

    let new_balance: i64 = sqlx::query_scalar(
        r#"
        UPDATE customers SET balance_cents = balance_cents + ?2, updated_at = ?3
        WHERE id = ?1
        RETURNING balance_cents
        "#,
    )
    .bind(customer_id)
    .bind(entry.amount.cents())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

    let old_balance = new_balance - entry.amount.cents();

    let sql = format!(
        r#"
        INSERT INTO balance_transactions (
            id, customer_id, amount_cents, old_balance_cents, new_balance_cents,
            description, kind, order_id, processed_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    );
    let transaction = sqlx::query_as::<_, BalanceTransaction>(&sql)
        .bind(generate_id())
        .bind(customer_id)
        .bind(entry.amount.cents())
        .bind(old_balance)
        .bind(new_balance)
        .bind(entry.description)
        .bind(entry.kind)
        .bind(entry.order_id)
        .bind(entry.actor)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

    info!(
        customer_id = %customer_id,
        amount = %entry.amount,
        old = old_balance,
        new = new_balance,
        kind = ?entry.kind,
        "Balance changed"
    );

    Ok(transaction)
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
    default_credit_limit_cents: i64,
}

impl CustomerRepository {
    pub(crate) fn new(pool: SqlitePool, default_credit_limit_cents: i64) -> Self {
        CustomerRepository {
            pool,
            default_credit_limit_cents,
        }
    }

    pub async fn create(&self, input: &NewCustomer) -> DbResult<Customer> {
        validate_new_customer(input)?;

        let credit_limit = input
            .credit_limit_cents
            .unwrap_or(self.default_credit_limit_cents);
        debug!(name = %input.name, credit_limit, "Creating customer");

        let sql = format!(
            r#"
            INSERT INTO customers (
                id, name, email, phone, address, balance_cents, credit_limit_cents,
                is_approved, active_cart_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 0, NULL, ?7, ?7)
            RETURNING {}
            "#,
            CUSTOMER_COLUMNS
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(generate_id())
            .bind(input.name.trim())
            .bind(input.email.as_deref())
            .bind(input.phone.as_deref())
            .bind(input.address.as_deref())
            .bind(credit_limit)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        info!(id = %customer.id, "Customer created");
        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS);
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Posts a manual ledger entry (opening balance, write-off, correction).
    ///
    /// Any sign is accepted. Order payments and refunds go through the order
    /// engine instead so the order and debt stay in step.
    pub async fn apply(
        &self,
        customer_id: &str,
        amount: Money,
        description: &str,
        kind: TransactionKind,
        order_id: Option<&str>,
        actor: Option<&str>,
    ) -> DbResult<BalanceTransaction> {
        let mut tx = self.pool.begin().await?;
        let transaction = apply_balance(
            &mut tx,
            customer_id,
            BalanceEntry {
                amount,
                description,
                kind,
                order_id,
                actor,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(transaction)
    }

    /// Ledger rows, oldest first.
    pub async fn transactions(&self, customer_id: &str) -> DbResult<Vec<BalanceTransaction>> {
        let sql = format!(
            "SELECT {} FROM balance_transactions WHERE customer_id = ?1 \
             ORDER BY created_at ASC, rowid ASC",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, BalanceTransaction>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// `credit_limit − balance`.
    pub async fn available_credit(&self, customer_id: &str) -> DbResult<Money> {
        self.get(customer_id)
            .await?
            .map(|c| c.available_credit())
            .ok_or_else(|| DbError::not_found("Customer", customer_id))
    }

    pub async fn set_approved(&self, customer_id: &str, approved: bool) -> DbResult<Customer> {
        let sql = format!(
            "UPDATE customers SET is_approved = ?2, updated_at = ?3 WHERE id = ?1 RETURNING {}",
            CUSTOMER_COLUMNS
        );
        sqlx::query_as::<_, Customer>(&sql)
            .bind(customer_id)
            .bind(approved)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))
    }

    pub async fn set_credit_limit(&self, customer_id: &str, limit_cents: i64) -> DbResult<Customer> {
        validate_non_negative("credit_limit", limit_cents)?;

        let sql = format!(
            "UPDATE customers SET credit_limit_cents = ?2, updated_at = ?3 WHERE id = ?1 RETURNING {}",
            CUSTOMER_COLUMNS
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(customer_id)
            .bind(limit_cents)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", customer_id))?;

        info!(id = %customer_id, limit_cents, "Credit limit changed");
        Ok(customer)
    }
}
