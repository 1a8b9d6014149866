//! # Store Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Built-in defaults                                                   │
//! │  2. storekeep.toml (explicit path, or the platform config dir)          │
//! │  3. STOREKEEP_* environment variables                                   │
//! │  4. validate()                                                          │
//! │                                                                         │
//! │  StoreConfig::db_config() ──► DbConfig ──► Database::new                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/storekeep/store.db"
//! max_connections = 5
//!
//! [ledger]
//! debt_term_days = 30
//! default_credit_limit_cents = 100000
//!
//! [cache]
//! enabled = true
//! ttl_secs = 300
//!
//! [alerts]
//! enabled = true
//! recipients = ["stock@example.com"]
//! queue_size = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use storekeep_core::debt::DEFAULT_DEBT_TERM_DAYS;
use storekeep_core::DEFAULT_CREDIT_LIMIT_CENTS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "storekeep", "storekeep")
        .map(|dirs| dirs.data_dir().join("storekeep.db"))
        .unwrap_or_else(|| PathBuf::from("storekeep.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Days between checkout and a debt's due date.
    #[serde(default = "default_debt_term_days")]
    pub debt_term_days: i64,

    /// Credit limit given to customers created without one.
    #[serde(default = "default_credit_limit")]
    pub default_credit_limit_cents: i64,
}

fn default_debt_term_days() -> i64 {
    DEFAULT_DEBT_TERM_DAYS
}

fn default_credit_limit() -> i64 {
    DEFAULT_CREDIT_LIMIT_CENTS
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            debt_term_days: default_debt_term_days(),
            default_credit_limit_cents: default_credit_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Staff addresses for low-stock emails. Empty means notifications only.
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_queue_size() -> usize {
    256
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            enabled: true,
            recipients: Vec::new(),
            queue_size: default_queue_size(),
        }
    }
}

// =============================================================================
// Store Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub alerts: AlertSettings,
}

impl StoreConfig {
    /// Loads defaults, then the TOML file, then environment overrides.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Store config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.ledger.debt_term_days < 0 {
            return Err(ConfigError::Invalid(
                "ledger.debt_term_days cannot be negative".into(),
            ));
        }
        if self.ledger.default_credit_limit_cents < 0 {
            return Err(ConfigError::Invalid(
                "ledger.default_credit_limit_cents cannot be negative".into(),
            ));
        }
        if self.alerts.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "alerts.queue_size must be greater than 0".into(),
            ));
        }
        if let Some(bad) = self.alerts.recipients.iter().find(|r| !r.contains('@')) {
            return Err(ConfigError::Invalid(format!(
                "alerts.recipients contains an invalid address: '{}'",
                bad
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOREKEEP_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("STOREKEEP_DB_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %max, "Ignoring invalid STOREKEEP_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(days) = std::env::var("STOREKEEP_DEBT_TERM_DAYS") {
            match days.parse() {
                Ok(days) => self.ledger.debt_term_days = days,
                Err(_) => warn!(value = %days, "Ignoring invalid STOREKEEP_DEBT_TERM_DAYS"),
            }
        }

        if let Ok(enabled) = std::env::var("STOREKEEP_CACHE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.cache.enabled = true,
                "0" | "false" | "no" => self.cache.enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid STOREKEEP_CACHE_ENABLED"),
            }
        }

        if let Ok(list) = std::env::var("STOREKEEP_ALERT_RECIPIENTS") {
            self.alerts.recipients = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "storekeep", "storekeep")
            .map(|dirs| dirs.config_dir().join("storekeep.toml"))
    }

    /// Builds the pool/engine configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .debt_term_days(self.ledger.debt_term_days)
            .default_credit_limit_cents(self.ledger.default_credit_limit_cents)
            .cache(self.cache.enabled, Duration::from_secs(self.cache.ttl_secs))
            .alert_recipients(if self.alerts.enabled {
                self.alerts.recipients.clone()
            } else {
                Vec::new()
            })
            .alert_queue_size(self.alerts.queue_size)
    }
}
