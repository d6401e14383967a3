//! # Inventory Configuration
//!
//! Runtime settings for the inventory services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_DB_PATH=/var/lib/stockroom/inventory.db                  │
//! │     STOCKROOM_MAX_WRITE_RETRIES=8                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockroom/inventory.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockroom.inventory/...  (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     in-memory database, threshold 10, 5 write retries                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # inventory.toml
//! [database]
//! path = "/var/lib/stockroom/inventory.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [stock]
//! default_low_stock_threshold = 10
//! low_stock_report_limit = 100
//!
//! [concurrency]
//! max_write_retries = 5
//! retry_backoff_ms = 10
//! collaborator_timeout_ms = 2000
//!
//! [compensation]
//! max_attempts = 10
//! poll_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use stockroom_db::DbConfig;

use crate::error::ConfigError;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how the item store is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. `None` opens a private in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum number of pooled connections (file databases only).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Stock Settings
// =============================================================================

/// Stock-status and reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSettings {
    /// Threshold given to items created from now on.
    #[serde(default = "default_low_stock_threshold")]
    pub default_low_stock_threshold: i64,

    /// Rows returned by the low-stock report.
    #[serde(default = "default_report_limit")]
    pub low_stock_report_limit: u32,
}

fn default_low_stock_threshold() -> i64 {
    stockroom_core::DEFAULT_LOW_STOCK_THRESHOLD
}

fn default_report_limit() -> u32 {
    100
}

impl Default for StockSettings {
    fn default() -> Self {
        StockSettings {
            default_low_stock_threshold: default_low_stock_threshold(),
            low_stock_report_limit: default_report_limit(),
        }
    }
}

// =============================================================================
// Concurrency Settings
// =============================================================================

/// Optimistic-concurrency and collaborator call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencySettings {
    /// Attempts per movement before a version conflict is reported.
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,

    /// First pause between attempts (milliseconds); doubles each time.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Upper bound for any call into a collaborator (milliseconds).
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_ms: u64,
}

fn default_max_write_retries() -> u32 {
    5
}

fn default_retry_backoff() -> u64 {
    10
}

fn default_collaborator_timeout() -> u64 {
    2_000
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        ConcurrencySettings {
            max_write_retries: default_max_write_retries(),
            retry_backoff_ms: default_retry_backoff(),
            collaborator_timeout_ms: default_collaborator_timeout(),
        }
    }
}

// =============================================================================
// Compensation Settings
// =============================================================================

/// Retry policy of the compensation worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationSettings {
    /// Entries at or above this many attempts wait for an operator.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff after a failing pass (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Ceiling of the backoff (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Interval between passes when everything succeeds (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Entries processed per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    50
}

impl Default for CompensationSettings {
    fn default() -> Self {
        CompensationSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Main Inventory Configuration
// =============================================================================

/// Complete inventory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub stock: StockSettings,

    #[serde(default)]
    pub concurrency: ConcurrencySettings,

    #[serde(default)]
    pub compensation: CompensationSettings,
}

impl InventoryConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (inventory.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading inventory config from file");
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

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load inventory config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> Result<(), ConfigError> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Inventory config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stock.default_low_stock_threshold < 0 {
            return Err(ConfigError::Invalid(
                "default_low_stock_threshold must not be negative".into(),
            ));
        }

        if self.concurrency.max_write_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_write_retries must be greater than 0".into(),
            ));
        }

        if self.concurrency.collaborator_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "collaborator_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.compensation.batch_size == 0 || self.compensation.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "compensation batch_size and poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOCKROOM_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(value) = std::env::var("STOCKROOM_LOW_STOCK_THRESHOLD") {
            match value.parse::<i64>() {
                Ok(threshold) => self.stock.default_low_stock_threshold = threshold,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKROOM_LOW_STOCK_THRESHOLD"),
            }
        }

        if let Ok(value) = std::env::var("STOCKROOM_MAX_WRITE_RETRIES") {
            match value.parse::<u32>() {
                Ok(retries) => self.concurrency.max_write_retries = retries,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKROOM_MAX_WRITE_RETRIES"),
            }
        }

        if let Ok(value) = std::env::var("STOCKROOM_COLLABORATOR_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.concurrency.collaborator_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKROOM_COLLABORATOR_TIMEOUT_MS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockroom", "inventory")
            .map(|dirs| dirs.config_dir().join("inventory.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database settings as the store understands them.
    pub fn db_config(&self) -> DbConfig {
        let config = match &self.database.path {
            Some(path) => DbConfig::new(path).max_connections(self.database.max_connections),
            None => DbConfig::in_memory(),
        };
        config.busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.concurrency.collaborator_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.concurrency.retry_backoff_ms)
    }
}
