//! # Database Pool Management
//!
//! Connection pool creation and the [`Database`] handle that hands out
//! repositories.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  DbConfig (builder, or StoreConfig::db_config())                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await                                            │
//! │       ├── SqlitePool  (WAL, foreign keys, busy timeout)                 │
//! │       ├── migrations                                                    │
//! │       ├── LowStockCache      (shared by every repository clone)         │
//! │       └── AlertDispatcher    (spawned tokio task, AlertHandle kept)     │
//! │                                                                         │
//! │  db.products()   db.inventory()  db.customers()  db.carts()             │
//! │  db.orders()     db.debts()      db.returns()    db.notifications()     │
//! │  db.discounts()                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Serialization
//! SQLite allows one writer at a time. Every ledger operation opens its
//! transaction with a write that claims the row it is about to
//! read-modify-write, so two operations on the same inventory row or
//! customer balance queue behind each other instead of interleaving. The
//! busy timeout turns lock contention into waiting rather than errors.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::alerts::{AlertDispatcher, Mailer, TracingMailer};
use crate::cache::LowStockCache;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cart::CartRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::debt::DebtRepository;
use crate::repository::discount::DiscountRepository;
use crate::repository::inventory::{InventoryRepository, StockWatch};
use crate::repository::notification::NotificationRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::returns::ReturnRepository;
use storekeep_core::debt::DEFAULT_DEBT_TERM_DAYS;
use storekeep_core::DEFAULT_CREDIT_LIMIT_CENTS;

// =============================================================================
// Configuration
// =============================================================================

/// Database and engine configuration.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/storekeep/store.db")
///     .max_connections(5)
///     .alert_recipients(vec!["stock@example.com".into()]);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a writer waits for the SQLite lock. Default: 10 seconds
    pub busy_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,

    /// Days until a new debt is due. Default: 30
    pub debt_term_days: i64,

    /// Default: 100000 ($1,000.00)
    pub default_credit_limit_cents: i64,

    pub cache_enabled: bool,
    pub cache_ttl: Duration,

    /// Low-stock email recipients. Empty disables email, not notifications.
    pub alert_recipients: Vec<String>,
    pub alert_queue_size: usize,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(10),
            run_migrations: true,
            debt_term_days: DEFAULT_DEBT_TERM_DAYS,
            default_credit_limit_cents: DEFAULT_CREDIT_LIMIT_CENTS,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            alert_recipients: Vec::new(),
            alert_queue_size: 256,
        }
    }

    /// Isolated in-memory database for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1, // each in-memory connection is its own database
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            ..DbConfig::new(":memory:")
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn debt_term_days(mut self, days: i64) -> Self {
        self.debt_term_days = days;
        self
    }

    pub fn default_credit_limit_cents(mut self, cents: i64) -> Self {
        self.default_credit_limit_cents = cents;
        self
    }

    pub fn cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.cache_enabled = enabled;
        self.cache_ttl = ttl;
        self
    }

    pub fn alert_recipients(mut self, recipients: Vec<String>) -> Self {
        self.alert_recipients = recipients;
        self
    }

    pub fn alert_queue_size(mut self, size: usize) -> Self {
        self.alert_queue_size = size;
        self
    }
}

// =============================================================================
// Database
// =============================================================================

/// Engine-wide settings shared by repositories.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LedgerSettings {
    pub debt_term_days: i64,
    pub default_credit_limit_cents: i64,
}

/// Main database handle providing repository access.
///
/// Cheap to clone; clones share the pool, the low-stock cache and the
/// alert dispatcher.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    watch: StockWatch,
    settings: LedgerSettings,
}

impl Database {
    /// Creates the pool, runs migrations and starts the alert dispatcher
    /// with the log-only [`TracingMailer`].
    ///
    /// Must be called inside a tokio runtime.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        Self::with_mailer(config, Arc::new(TracingMailer)).await
    }

    /// Same as [`Database::new`] with a custom email transport.
    pub async fn with_mailer(config: DbConfig, mailer: Arc<dyn Mailer>) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        if config.alert_recipients.is_empty() {
            debug!("No alert recipients configured, low-stock emails disabled");
        }

        let alerts = AlertDispatcher::spawn(mailer, config.alert_queue_size);
        let cache = LowStockCache::new(config.cache_enabled, config.cache_ttl);

        let db = Database {
            pool,
            watch: StockWatch::new(cache, alerts, config.alert_recipients),
            settings: LedgerSettings {
                debt_term_days: config.debt_term_days,
                default_credit_limit_cents: config.default_credit_limit_cents,
            },
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// For queries not covered by repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The shared low-stock cache.
    pub fn low_stock_cache(&self) -> &LowStockCache {
        self.watch.cache()
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone(), self.watch.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone(), self.watch.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone(), self.settings.default_credit_limit_cents)
    }

    pub fn carts(&self) -> CartRepository {
        CartRepository::new(self.pool.clone(), self.settings.debt_term_days)
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), self.watch.clone())
    }

    pub fn debts(&self) -> DebtRepository {
        DebtRepository::new(self.pool.clone(), self.watch.clone())
    }

    pub fn returns(&self) -> ReturnRepository {
        ReturnRepository::new(self.pool.clone(), self.watch.clone())
    }

    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository::new(self.pool.clone())
    }

    pub fn discounts(&self) -> DiscountRepository {
        DiscountRepository::new(self.pool.clone())
    }

    /// Stops the alert dispatcher and closes the pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        if let Err(e) = self.watch.alerts().shutdown().await {
            warn!(error = %e, "Alert dispatcher already stopped");
        }
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/store.db")
            .max_connections(10)
            .min_connections(2)
            .debt_term_days(14)
            .cache(false, Duration::ZERO);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.debt_term_days, 14);
        assert!(!config.cache_enabled);
    }

    #[tokio::test]
    async fn test_close_stops_health() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
