//! # Configuration
//!
//! Settings for the database, the sale coordinator and the alert monitor.
//!
//! ## Load Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults (compiled in)                                              │
//! │  2. stockroom.toml                                                      │
//! │     ~/.config/stockroom/stockroom.toml (Linux)                          │
//! │     ~/Library/Application Support/com.stockroom.inventory/... (macOS)   │
//! │  3. STOCKROOM_* environment variables                                   │
//! │  4. validate()                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [database]
//! path = "/var/lib/stockroom/stockroom.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [sales]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//! transaction_timeout_secs = 10
//!
//! [alerts]
//! low_stock_threshold = 10
//! expiry_window_days = 7
//! scan_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockroom_core::alerts::AlertThresholds;
use stockroom_core::{DEFAULT_EXPIRY_WINDOW_DAYS, DEFAULT_LOW_STOCK_THRESHOLD};

const CONFIG_FILE_NAME: &str = "stockroom.toml";
const DATABASE_FILE_NAME: &str = "stockroom.db";

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. `None` means `stockroom.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on a held lock before reporting BUSY.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns the configured path, or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "stockroom", "inventory")
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
        })
    }
}

// =============================================================================
// Sale Settings
// =============================================================================

/// Retry and timeout policy for sale transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSettings {
    /// Attempts per sale, including the first. Conflicts and busy errors
    /// trigger another attempt; everything else is final.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Deadline for one attempt, begin to commit.
    #[serde(default = "default_transaction_timeout_secs")]
    pub transaction_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    20
}
fn default_max_backoff_ms() -> u64 {
    500
}
fn default_transaction_timeout_secs() -> u64 {
    10
}

impl Default for SaleSettings {
    fn default() -> Self {
        SaleSettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            transaction_timeout_secs: default_transaction_timeout_secs(),
        }
    }
}

impl SaleSettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_secs)
    }
}

// =============================================================================
// Alert Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,

    #[serde(default = "default_expiry_window_days")]
    pub expiry_window_days: i64,

    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_low_stock_threshold() -> i64 {
    DEFAULT_LOW_STOCK_THRESHOLD
}
fn default_expiry_window_days() -> i64 {
    DEFAULT_EXPIRY_WINDOW_DAYS
}
fn default_scan_interval_secs() -> u64 {
    30
}

impl Default for AlertSettings {
    fn default() -> Self {
        AlertSettings {
            low_stock_threshold: default_low_stock_threshold(),
            expiry_window_days: default_expiry_window_days(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

impl AlertSettings {
    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            low_stock_threshold: self.low_stock_threshold,
            expiry_window_days: self.expiry_window_days,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Stockroom configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockroomConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SaleSettings,

    #[serde(default)]
    pub alerts: AlertSettings,
}

impl StockroomConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else the platform config dir)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("no config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Rejects settings the coordinator or pool cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.sales.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "sales.max_attempts must be greater than 0".into(),
            ));
        }
        if self.sales.transaction_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sales.transaction_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.sales.initial_backoff_ms > self.sales.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "sales.initial_backoff_ms must not exceed sales.max_backoff_ms".into(),
            ));
        }
        if self.alerts.low_stock_threshold < 0 || self.alerts.expiry_window_days < 0 {
            return Err(ConfigError::Invalid(
                "alert thresholds must not be negative".into(),
            ));
        }
        if self.alerts.scan_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "alerts.scan_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `STOCKROOM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOCKROOM_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        override_parsed(&lookup, "STOCKROOM_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_parsed(&lookup, "STOCKROOM_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);
        override_parsed(&lookup, "STOCKROOM_SALE_MAX_ATTEMPTS", &mut self.sales.max_attempts);
        override_parsed(
            &lookup,
            "STOCKROOM_SALE_TIMEOUT_SECS",
            &mut self.sales.transaction_timeout_secs,
        );
        override_parsed(
            &lookup,
            "STOCKROOM_LOW_STOCK_THRESHOLD",
            &mut self.alerts.low_stock_threshold,
        );
        override_parsed(
            &lookup,
            "STOCKROOM_EXPIRY_WINDOW_DAYS",
            &mut self.alerts.expiry_window_days,
        );
        override_parsed(
            &lookup,
            "STOCKROOM_ALERT_INTERVAL_SECS",
            &mut self.alerts.scan_interval_secs,
        );
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockroom", "inventory")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding setting from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
