use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoordError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    pub store: StoreConfig,
    pub lease: LeasePolicyConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the durable lease file and its lock.
    pub dir: PathBuf,
    /// Bound on waiting for the store's advisory lock.
    pub lock_timeout_ms: u64,
    pub lock_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeasePolicyConfig {
    /// Default time-to-live stamped on granted leases, if any. Expired
    /// leases still block until swept.
    pub default_ttl_hours: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub enabled: bool,
    pub importance: crate::types::MailImportance,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".agent-lease"),
            lock_timeout_ms: 5_000,
            lock_poll_interval_ms: 50,
        }
    }
}

impl Default for LeasePolicyConfig {
    fn default() -> Self {
        Self {
            default_ttl_hours: Some(4),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            importance: crate::types::MailImportance::Normal,
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            lease: LeasePolicyConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl CoordinationConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoordError::Config(format!("failed to read {path}: {e}")))?;
        let config: CoordinationConfig = toml::from_str(&content)
            .map_err(|e| CoordError::Config(format!("failed to parse {path}: {e}")))?;
        Ok(config)
    }
}
