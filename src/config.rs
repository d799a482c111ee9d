// Store configuration: where entity files live and how long to wait for the
// entity lock before giving up.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DATA_DIR_ENV: &str = "HOTEL_INVENTORY_DATA_DIR";
pub const LOCK_TIMEOUT_ENV: &str = "HOTEL_INVENTORY_LOCK_TIMEOUT_MS";
pub const LOCK_POLL_ENV: &str = "HOTEL_INVENTORY_LOCK_POLL_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub lock_timeout_ms: u64,
    pub lock_poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            lock_timeout_ms: 10_000,
            lock_poll_interval_ms: 25,
        }
    }
}

impl StoreConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    // Missing fields fall back to the defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validated()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    // Applies overrides from any key/value source (the process environment in
    // `from_env`)
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(LOCK_TIMEOUT_ENV) {
            self.lock_timeout_ms = parse_millis(LOCK_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(LOCK_POLL_ENV) {
            self.lock_poll_interval_ms = parse_millis(LOCK_POLL_ENV, &value)?;
        }
        self.validated()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.lock_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "lock_poll_interval_ms".to_string(),
                value: "0".to_string(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "data_dir".to_string(),
                value: String::new(),
            });
        }
        Ok(self)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
