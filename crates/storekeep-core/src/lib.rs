//! # storekeep-core: Pure Domain Rules for Storekeep
//!
//! Everything the order engine decides without touching storage: money
//! arithmetic, payment-status derivation, the order status machine, debt
//! settlement, discount evaluation, return rules and receipt projection.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storekeep Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Callers (HTTP handlers, admin tools, seed binary)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   storekeep-db (ledgers, engine)                │   │
//! │  │   one SQLite transaction per operation, alert dispatcher        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ storekeep-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   types  money  payment  debt  discount  returns  stock  receipt│   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use storekeep_core::{payment, Money, PaymentStatus};
//!
//! let total = Money::from_units(200);
//! let status = payment::derive_payment_status(Money::from_units(50), total);
//! assert_eq!(status, PaymentStatus::Partial);
//! ```

pub mod debt;
pub mod discount;
pub mod error;
pub mod money;
pub mod payment;
pub mod receipt;
pub mod returns;
pub mod stock;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use receipt::{Receipt, ReceiptLine};
pub use stock::{LowStockAlert, StockOutcome};
pub use types::*;

/// Length of a generated order number.
pub const ORDER_NUMBER_LEN: usize = 20;

/// Largest quantity accepted on a single cart, order or return line.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Minimum stock level for products created without one.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 5;

/// Credit limit for customers created without one ($1,000.00).
pub const DEFAULT_CREDIT_LIMIT_CENTS: i64 = 100_000;
