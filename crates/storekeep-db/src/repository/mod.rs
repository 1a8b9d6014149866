//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  caller ──► db.orders().add_payment(order, amount, ...)                 │
//! │                  │                                                      │
//! │                  ▼  pool.begin()                                        │
//! │            ┌──────────────────────────────────────────────┐             │
//! │            │ order::post_payment      (claims order row)  │             │
//! │            │ customer::apply_balance  (balance ledger)    │             │
//! │            │ payment status derivation (storekeep-core)   │             │
//! │            │ debt settlement                              │             │
//! │            │ inventory::decrement_for_sale (on confirm)   │             │
//! │            └──────────────────────────────────────────────┘             │
//! │                  │  commit                                              │
//! │                  ▼                                                      │
//! │            StockWatch::committed (cache invalidation, alert emails)     │
//! │                                                                         │
//! │  Ledger helpers take `&mut SqliteConnection` so they compose inside     │
//! │  one transaction. Public methods own the transaction.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - catalog
//! - [`InventoryRepository`](inventory::InventoryRepository) - inventory ledger
//! - [`CustomerRepository`](customer::CustomerRepository) - balance ledger
//! - [`CartRepository`](cart::CartRepository) - carts and checkout
//! - [`OrderRepository`](order::OrderRepository) - payments, status, discounts, receipts
//! - [`DebtRepository`](debt::DebtRepository) - debt tracker
//! - [`ReturnRepository`](returns::ReturnRepository) - returns and refunds
//! - [`NotificationRepository`](notification::NotificationRepository) - staff notifications
//! - [`DiscountRepository`](discount::DiscountRepository) - discount codes

pub mod cart;
pub mod customer;
pub mod debt;
pub mod discount;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod product;
pub mod returns;

/// Product columns joined with the inventory quantity.
macro_rules! select_product {
    ($tail:literal) => {
        concat!(
            "SELECT p.id, p.sku, p.barcode, p.name, p.description, p.price_cents, ",
            "p.cost_cents, p.min_stock_level, p.is_active, i.quantity AS current_stock, ",
            "p.created_at, p.updated_at ",
            "FROM products p INNER JOIN inventory i ON i.product_id = p.id ",
            $tail
        )
    };
}

pub(crate) use select_product;
