//! Service configuration
//!
//! Loaded from a TOML file; every field has a default so a config file only
//! needs to name what it overrides. The economy tables themselves live in
//! [`lode_economy::EconomyParams`] and appear here under `[economy]`.

use lode_economy::EconomyParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Economy tables and policy knobs
    #[serde(default)]
    pub economy: EconomyParams,

    /// Accrual scheduler cadence and persistence throttle
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Ledger store call policy
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification targets
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        config.economy.validate()?;
        Ok(config)
    }

    /// Initialize tracing from the logging section. `RUST_LOG` overrides
    /// the configured level when set.
    pub fn init_logging(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.logging.level.clone()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if self.logging.format == "json" {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            tracing::debug!("logging already initialized");
        }
    }
}

/// Accrual scheduler settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick cadence in seconds
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Minimum seconds between accrual persists per user
    #[serde(default = "default_persist_throttle_secs")]
    pub persist_throttle_secs: u64,
}

fn default_tick_secs() -> u64 {
    1
}

fn default_persist_throttle_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            persist_throttle_secs: default_persist_throttle_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn persist_throttle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.persist_throttle_secs as i64)
    }
}

/// Ledger store call policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Per-call timeout in milliseconds (one retry on failure)
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    3_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Notification targets
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Admin channel identifier for review notifications
    #[serde(default = "default_admin_channel")]
    pub admin_channel: String,
}

fn default_admin_channel() -> String {
    "admin".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            admin_channel: default_admin_channel(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.scheduler.tick_secs, 1);
        assert_eq!(config.scheduler.persist_throttle_secs, 30);
        assert_eq!(config.store.timeout_ms, 3_000);
        config.economy.validate().unwrap();
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scheduler]\npersist_throttle_secs = 60\n\n[economy]\nclaim_fee_bps = 75\n"
        )
        .unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scheduler.persist_throttle_secs, 60);
        assert_eq!(config.scheduler.tick_secs, 1);
        assert_eq!(config.economy.claim_fee_bps, 75);
        assert_eq!(config.economy.max_level, 3);
    }

    #[test]
    fn test_invalid_economy_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[economy]\nrate_upgrade_cost = [0, 100, 50]\n").unwrap();
        assert!(ServiceConfig::from_file(file.path()).is_err());
    }
}
