//! Layered configuration for the TrafficLink service.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults (the constant modules below)
//! 2. `config.toml` (TOML format)
//! 3. environment variables (`env_vars`)
//!
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Server defaults.
pub mod server {
    pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
    /// Dashboard origin allowed by CORS.
    pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
    /// Request body cap in bytes.
    pub const MAX_REQUEST_BODY_SIZE: usize = 64 * 1024;
}

/// Storage defaults.
pub mod storage {
    pub const DEFAULT_DB_PATH: &str = "data/trafficlink.redb";
}

/// Polling protocol limits.
pub mod polling {
    /// Hard cap on commands returned by a single poll.
    pub const MAX_BATCH: usize = 10;
    /// Lease placed on commands handed out by a poll, in seconds.
    pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 30;
    /// Longest accepted lease: one day.
    pub const MAX_CLAIM_LEASE_SECS: u64 = 86_400;
    pub const DEFAULT_HISTORY_LIMIT: usize = 50;
    pub const MAX_HISTORY_LIMIT: usize = 500;
}

/// Preference bounds and defaults.
pub mod preferences {
    pub const SAMPLING_RATE_MS_MIN: u32 = 100;
    pub const SAMPLING_RATE_MS_MAX: u32 = 10_000;
    pub const SAMPLING_RATE_MS_DEFAULT: u32 = 1_000;

    pub const JAM_THRESHOLD_CM_MIN: u32 = 10;
    pub const JAM_THRESHOLD_CM_MAX: u32 = 500;
    pub const JAM_THRESHOLD_CM_DEFAULT: u32 = 50;
}

/// Environment variable names.
pub mod env_vars {
    pub const BIND: &str = "TRAFFICLINK_BIND";
    pub const DB_PATH: &str = "TRAFFICLINK_DB_PATH";
    pub const CORS_ORIGIN: &str = "TRAFFICLINK_CORS_ORIGIN";
    pub const CLAIM_LEASE_SECS: &str = "TRAFFICLINK_CLAIM_LEASE_SECS";
    pub const REQUIRE_DEVICE_KEY: &str = "TRAFFICLINK_REQUIRE_DEVICE_KEY";
    pub const LOG_JSON: &str = "TRAFFICLINK_LOG_JSON";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: server::DEFAULT_BIND.to_string(),
            cors_origin: server::DEFAULT_CORS_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(storage::DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Commands handed out per poll. Clamped to [`polling::MAX_BATCH`].
    pub batch_limit: usize,
    /// Poll lease in seconds. `0` disables claiming.
    pub claim_lease_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            batch_limit: polling::MAX_BATCH,
            claim_lease_secs: polling::DEFAULT_CLAIM_LEASE_SECS,
        }
    }
}

impl PollingConfig {
    pub fn effective_batch_limit(&self) -> usize {
        self.batch_limit.clamp(1, polling::MAX_BATCH)
    }

    pub fn claim_lease(&self) -> Option<Duration> {
        (self.claim_lease_secs > 0).then(|| Duration::from_secs(self.claim_lease_secs))
    }

    fn validate(&self) -> Result<()> {
        if self.claim_lease_secs > polling::MAX_CLAIM_LEASE_SECS {
            return Err(Error::config(format!(
                "polling.claim_lease_secs must be at most {}, got {}",
                polling::MAX_CLAIM_LEASE_SECS,
                self.claim_lease_secs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require devices to present their API key on poll, report and sync.
    pub require_device_key: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_device_key: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub polling: PollingConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from `path` (or `config.toml` if present) and the
    /// process environment.
    ///
    /// An explicitly given path must exist. The default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(category = "config", path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.polling.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(env_vars::BIND) {
            self.server.bind = bind;
        }
        if let Some(origin) = lookup(env_vars::CORS_ORIGIN) {
            self.server.cors_origin = origin;
        }
        if let Some(path) = lookup(env_vars::DB_PATH) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(env_vars::CLAIM_LEASE_SECS) {
            self.polling.claim_lease_secs = raw.trim().parse().map_err(|_| {
                Error::config(format!("{} must be a number of seconds", env_vars::CLAIM_LEASE_SECS))
            })?;
        }
        if let Some(raw) = lookup(env_vars::REQUIRE_DEVICE_KEY) {
            self.auth.require_device_key = parse_bool(env_vars::REQUIRE_DEVICE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(env_vars::LOG_JSON) {
            self.log.json = parse_bool(env_vars::LOG_JSON, &raw)?;
        }
        self.polling.validate()
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{} must be true or false, got '{}'", name, raw))),
    }
}
