//! Configuration management for the logging system
//!
//! Logging settings are part of the engine configuration file and can be
//! overridden per module through `features`, or wholesale through the
//! `RUST_LOG` environment variable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log levels accepted in configuration files.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main logging configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level for all modules
    pub default_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Enable colored output
    pub enable_colors: bool,
    /// Include module path
    pub include_module: bool,
    /// Module-specific log levels, e.g. `dataspec::external_op = "debug"`
    pub features: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            json: false,
            enable_colors: true,
            include_module: true,
            features: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Checks every configured level against [`LOG_LEVELS`].
    pub fn validate(&self) -> Result<(), String> {
        let check = |level: &str| {
            if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!("Invalid log level: {}", level))
            }
        };
        check(&self.default_level)?;
        for level in self.features.values() {
            check(level)?;
        }
        Ok(())
    }

    /// Renders the configuration as an `EnvFilter` directive string.
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.default_level.to_lowercase())
            .chain(
                self.features
                    .iter()
                    .map(|(module, level)| format!("{}={}", module, level.to_lowercase())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LogConfig::default().validate().is_ok());
        assert_eq!(LogConfig::default().filter_directives(), "info");
    }

    #[test]
    fn test_feature_levels_in_directives() {
        let mut config = LogConfig::default();
        config
            .features
            .insert("dataspec::external_op".to_string(), "DEBUG".to_string());
        assert_eq!(config.filter_directives(), "info,dataspec::external_op=debug");
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LogConfig {
            default_level: "loud".to_string(),
            ..LogConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
