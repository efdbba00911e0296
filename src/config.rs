//! Bridge configuration
//!
//! Loaded from `mirror-bridge.toml`, from environment variables, or built in
//! code. Applying a config installs the process-wide defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::BridgeError;
use crate::logging::{self, LogConfig};
use crate::mirror::LockPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Creation lock granularity for slots built with `MirrorSlot::new`
    #[serde(default)]
    pub lock_policy: LockPolicy,

    /// Log level name (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BridgeConfig {
    /// Read `MIRROR_BRIDGE_LOCK_POLICY` and `MIRROR_BRIDGE_LOG_LEVEL`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("MIRROR_BRIDGE_LOCK_POLICY") {
            match policy.parse() {
                Ok(policy) => config.lock_policy = policy,
                Err(err) => logging::warn!(%err, "Ignoring MIRROR_BRIDGE_LOCK_POLICY"),
            }
        }

        if let Ok(level) = std::env::var("MIRROR_BRIDGE_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Parse configuration from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, BridgeError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if logging::parse_level(&self.log_level).is_none() {
            return Err(BridgeError::Config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Logging configuration derived from this config and the environment
    pub fn log_config(&self) -> LogConfig {
        let mut log = LogConfig::from_env();
        if let Some(level) = logging::parse_level(&self.log_level) {
            log.level = level;
        }
        log
    }

    /// Install process-wide defaults
    pub fn apply(&self) {
        LockPolicy::set_process_default(self.lock_policy);
        logging::debug!(lock_policy = ?self.lock_policy, "Bridge configuration applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.lock_policy, LockPolicy::Shared);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            lock_policy = "per-object"
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.lock_policy, LockPolicy::PerObject);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_parse_toml_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_rejects_unknown_level() {
        let err = BridgeConfig::from_toml_str(r#"log_level = "chatty""#).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(BridgeConfig::from_toml_str(r#"lock_policy = "global""#).is_err());
    }
}
