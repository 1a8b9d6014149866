//! # Domain Types
//!
//! Records shared by every Storekeep component.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Product ──1:1──► Inventory ──1:N──► InventoryHistory (append-only)     │
//! │                                                                         │
//! │  Customer ──1:N──► BalanceTransaction (append-only, balance = Σ)        │
//! │     │                                                                   │
//! │     ├──1:N──► Cart ──1:N──► CartItem       (active_cart_id ≤ 1)         │
//! │     │                                                                   │
//! │     └──1:N──► Order ──1:N──► OrderItem                                  │
//! │                 │   ──1:N──► Payment        (signed, immutable)         │
//! │                 │   ──1:1──► Debt           (remaining never grows)     │
//! │                 └── ──1:N──► ProductReturn                              │
//! │                                                                         │
//! │  Notification, Discount: standalone                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary columns are stored as `*_cents: i64` and exposed as [`Money`]
//! through accessor methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;
use crate::ORDER_NUMBER_LEN;

/// Generates a new primary key.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates an order number: 20 uppercase hex characters.
///
/// Assigned once when the order row is created and never regenerated.
pub fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..ORDER_NUMBER_LEN].to_uppercase()
}

// =============================================================================
// Product
// =============================================================================

/// A catalog product, joined with its current inventory quantity.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    /// Business identifier, unique.
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    /// Stock at or below this level is "low".
    pub min_stock_level: i64,
    pub is_active: bool,
    /// Quantity from the product's Inventory row.
    pub current_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// True when current stock is at or below the minimum level.
    pub fn is_low_stock(&self) -> bool {
        crate::stock::is_low_stock(self.current_stock, self.min_stock_level)
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    /// Defaults to [`crate::DEFAULT_MIN_STOCK_LEVEL`].
    pub min_stock_level: Option<i64>,
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock record. Exactly one per product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Inventory {
    pub id: String,
    pub product_id: String,
    pub quantity: i64,
    pub location: String,
    #[ts(as = "Option<String>")]
    pub last_restocked: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_audited: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Why an inventory quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAction {
    Restock,
    Sale,
    Adjustment,
    Damage,
    Return,
}

/// One immutable row per inventory write.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryHistory {
    pub id: String,
    pub inventory_id: String,
    pub old_quantity: i64,
    pub new_quantity: i64,
    /// Always `new_quantity - old_quantity`.
    pub difference: i64,
    pub reason: String,
    pub action: InventoryAction,
    pub changed_by: Option<String>,
    #[ts(as = "String")]
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// Customer & Balance Ledger
// =============================================================================

/// A customer account with a running balance.
///
/// Positive balance means the customer owes the store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    /// Label printed on receipts.
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub balance_cents: i64,
    pub credit_limit_cents: i64,
    pub is_approved: bool,
    /// The single active cart, if any.
    pub active_cart_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    #[inline]
    pub fn credit_limit(&self) -> Money {
        Money::from_cents(self.credit_limit_cents)
    }

    /// `credit_limit - balance`. Negative once the limit is exceeded.
    pub fn available_credit(&self) -> Money {
        self.credit_limit() - self.balance()
    }

    pub fn has_available_credit(&self) -> bool {
        self.balance() < self.credit_limit()
    }
}

/// Input for creating a customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Falls back to the configured default credit limit.
    pub credit_limit_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Payment,
    Purchase,
    Adjustment,
    Refund,
}

/// Immutable balance change with before/after snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BalanceTransaction {
    pub id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub old_balance_cents: i64,
    pub new_balance_cents: i64,
    pub description: String,
    pub kind: TransactionKind,
    pub order_id: Option<String>,
    pub processed_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl BalanceTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Cart {
    pub id: String,
    pub customer_id: String,
    /// False once checked out. Inactive carts are kept for history.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A cart line. Price is snapshotted on first add.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub price_cents: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn subtotal(&self) -> Money {
        self.price().multiply_quantity(self.quantity)
    }
}

/// Σ quantity × price over the cart's lines.
pub fn cart_total(items: &[CartItem]) -> Money {
    items.iter().map(CartItem::subtotal).sum()
}

// =============================================================================
// Order
// =============================================================================

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    fn stage(self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled | OrderStatus::Refunded => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Checks a caller-driven status change.
    ///
    /// ```text
    /// pending → confirmed → processing → shipped → delivered
    ///    └──────────┴────────────┴──────────┴──► cancelled
    ///    └──────────┴────────────┴──────────┴──────────┴──► refunded
    /// ```
    /// Forward moves may skip stages. Nothing leaves cancelled or refunded.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self == next || self.is_terminal() {
            return false;
        }
        match next {
            OrderStatus::Refunded => true,
            OrderStatus::Cancelled => self != OrderStatus::Delivered,
            _ => next.stage() > self.stage(),
        }
    }

    /// Whether moving from `self` to `next` takes stock for the order's lines.
    ///
    /// Stock leaves the shelf once, when an order first moves past pending
    /// to a fulfilment state.
    pub fn commits_stock(self, next: OrderStatus) -> bool {
        self == OrderStatus::Pending
            && matches!(
                next,
                OrderStatus::Confirmed
                    | OrderStatus::Processing
                    | OrderStatus::Shipped
                    | OrderStatus::Delivered
            )
    }

    /// Order items added in these states take stock immediately.
    pub fn takes_stock(self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Processing)
    }
}

/// Derived from Σ payments vs total. See [`crate::payment::derive_payment_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// 20 uppercase hex characters, immutable.
    pub order_number: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Frozen at checkout.
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    /// `subtotal + tax - discount`.
    pub total_cents: i64,
    pub discount_code: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// An order line. Price never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub price_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn subtotal(&self) -> Money {
        self.price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Bank,
    Credit,
    Mpesa,
}

/// A payment against an order. Negative amounts are refunds.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// The payment a refund hands back. `None` for ordinary payments.
    pub refund_of: Option<String>,
    pub processed_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Debt
// =============================================================================

/// The unpaid remainder of an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Debt {
    pub id: String,
    pub customer_id: String,
    pub order_id: String,
    pub initial_amount_cents: i64,
    /// Never increases. Floored at zero.
    pub remaining_amount_cents: i64,
    #[ts(as = "String")]
    pub due_date: DateTime<Utc>,
    /// `remaining_amount <= 0`, recomputed on every write.
    pub is_settled: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Debt {
    #[inline]
    pub fn initial_amount(&self) -> Money {
        Money::from_cents(self.initial_amount_cents)
    }

    #[inline]
    pub fn remaining_amount(&self) -> Money {
        Money::from_cents(self.remaining_amount_cents)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_settled && self.due_date < now
    }
}

// =============================================================================
// Returns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    CustomerChangeMind,
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
}

/// A customer return against an order line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductReturn {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub reason: ReturnReason,
    pub notes: Option<String>,
    pub status: ReturnStatus,
    /// Set on approval.
    pub refund_amount_cents: Option<i64>,
    pub created_by: Option<String>,
    pub processed_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProductReturn {
    pub fn refund_amount(&self) -> Option<Money> {
        self.refund_amount_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LowStock,
    NewOrder,
    PaymentReceived,
    DebtReminder,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Id of the product/order the notification is about.
    pub related_id: Option<String>,
    pub is_read: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Discounts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is basis points of the subtotal (1000 = 10%).
    Percentage,
    /// `value` is cents.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Discount {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_cents: Option<i64>,
    pub max_discount_cents: Option<i64>,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub usage_limit: Option<i64>,
    pub times_used: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Input for creating a discount code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewDiscount {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub value: i64,
    pub min_order_cents: Option<i64>,
    pub max_discount_cents: Option<i64>,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<i64>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number();
        assert_eq!(number.len(), 20);
        assert!(number
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(number, generate_order_number());
    }

    #[test]
    fn test_status_machine_forward_only() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Processing));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn test_status_machine_side_exits() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Refunded));
        assert!(Delivered.can_transition_to(Refunded));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Cancelled));
    }

    #[test]
    fn test_takes_stock() {
        assert!(!OrderStatus::Pending.takes_stock());
        assert!(OrderStatus::Confirmed.takes_stock());
        assert!(OrderStatus::Processing.takes_stock());
        assert!(!OrderStatus::Shipped.takes_stock());
    }

    #[test]
    fn test_commits_stock_only_when_leaving_pending() {
        use OrderStatus::*;

        assert!(Pending.commits_stock(Confirmed));
        assert!(Pending.commits_stock(Delivered));
        assert!(!Pending.commits_stock(Cancelled));
        assert!(!Pending.commits_stock(Pending));
        assert!(!Confirmed.commits_stock(Processing));
        assert!(!Processing.commits_stock(Shipped));
    }

    #[test]
    fn test_customer_credit() {
        let now = Utc::now();
        let customer = Customer {
            id: generate_id(),
            name: "Amina".to_string(),
            email: None,
            phone: None,
            address: None,
            balance_cents: 120_000,
            credit_limit_cents: 100_000,
            is_approved: true,
            active_cart_id: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(customer.available_credit().cents(), -20_000);
        assert!(!customer.has_available_credit());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReturnReason::CustomerChangeMind).unwrap(),
            "\"customer_change_mind\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationKind::LowStock).unwrap(),
            "\"low_stock\""
        );
    }
}
