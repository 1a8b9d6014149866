//! # storekeep-db: Ledgers and Order Engine for Storekeep
//!
//! Every state-changing operation of the store runs here, one SQLite
//! transaction per call: the inventory and balance ledgers, carts and
//! checkout, payments, debts, returns and low-stock notifications.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storekeep Data Flow                              │
//! │                                                                         │
//! │  Caller (HTTP handler, admin tool, seed binary)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storekeep-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │    │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │    │   │
//! │  │   │               │    │ inventory     │    │              │    │   │
//! │  │   │ SqlitePool    │◄───│ customer      │    │ 001_initial  │    │   │
//! │  │   │ LowStockCache │    │ cart, order   │    │   _schema    │    │   │
//! │  │   │ AlertHandle   │    │ debt, returns │    │              │    │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  SQLite database                 AlertDispatcher task ──► Mailer        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - connection pool and the [`Database`] handle
//! - [`config`] - `storekeep.toml` and environment configuration
//! - [`migrations`] - embedded schema migrations
//! - [`error`] - database error types
//! - [`repository`] - ledgers and engine operations
//! - [`cache`] - invalidate-on-write low-stock cache
//! - [`alerts`] - background low-stock email dispatcher
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storekeep_db::{Database, StoreConfig};
//!
//! let config = StoreConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let cart = db.carts().active_cart(&customer.id).await?;
//! db.carts().add_item(&cart.id, &product.id, 2).await?;
//! let checkout = db.carts().checkout(&cart.id, Some("till-1")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod cache;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use alerts::{AlertEmail, AlertError, Mailer, TracingMailer};
pub use cache::LowStockCache;
pub use config::{ConfigError, StoreConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::{CartRepository, Checkout};
pub use repository::customer::CustomerRepository;
pub use repository::debt::DebtRepository;
pub use repository::discount::DiscountRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::notification::NotificationRepository;
pub use repository::order::{OrderItemOutcome, OrderRepository, PaymentOutcome, StatusChange};
pub use repository::product::ProductRepository;
pub use repository::returns::ReturnRepository;
