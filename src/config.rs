//! Configuration for the dataspec engine.
//!
//! Configuration is loaded once (from TOML or JSON) and handed explicitly to
//! the components that need it; nothing reads global state at import time.

use crate::constants::{DEFAULT_DP_SEED, DEFAULT_SCHEMA_SAMPLE_ROWS, PANDAS_LIBRARY};
use crate::error::{DataSpecError, DataSpecResult};
use crate::logging::LogConfig;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Operator routing tables
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Evaluation settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

impl EngineConfig {
    /// Loads a configuration file; `.json` files are parsed as JSON,
    /// anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> DataSpecResult<Self> {
        let path = path.as_ref();
        info!("Loading engine configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DataSpecResult<()> {
        self.routing.validate()?;
        self.execution.validate()?;
        debug!(
            "Engine configuration valid: {} libraries routed",
            self.routing.libraries.len()
        );
        Ok(())
    }
}

/// Routing table: `{library: {op_name: implementation_symbol}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingConfig {
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoutingConfig {
    pub fn empty() -> Self {
        Self {
            libraries: BTreeMap::new(),
        }
    }

    /// Routes the built-in `pandas` library to its symbols.
    pub fn builtin() -> Self {
        let ops = crate::library::pandas::OP_NAMES
            .iter()
            .map(|op| (op.to_string(), crate::library::pandas::symbol(op)))
            .collect();
        Self {
            libraries: BTreeMap::from([(PANDAS_LIBRARY.to_string(), ops)]),
        }
    }

    pub fn route(mut self, library: &str, op_name: &str, symbol: &str) -> Self {
        self.libraries
            .entry(library.to_string())
            .or_default()
            .insert(op_name.to_string(), symbol.to_string());
        self
    }

    pub fn symbol(&self, library: &str, op_name: &str) -> Option<&str> {
        self.libraries
            .get(library)
            .and_then(|ops| ops.get(op_name))
            .map(String::as_str)
    }

    pub fn validate(&self) -> DataSpecResult<()> {
        for (library, ops) in &self.libraries {
            if library.is_empty() || library.contains('.') {
                return Err(DataSpecError::configuration_with_key(
                    format!("invalid library name '{}'", library),
                    "routing",
                ));
            }
            for (op_name, symbol) in ops {
                if op_name.is_empty() || symbol.is_empty() {
                    return Err(DataSpecError::configuration_with_key(
                        format!("empty routing entry in library '{}'", library),
                        format!("routing.{}", library),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Synthetic rows evaluated when inferring a dataset schema
    pub schema_sample_rows: usize,
    /// Seed for DP transforms that carry none
    pub default_seed: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            schema_sample_rows: DEFAULT_SCHEMA_SAMPLE_ROWS,
            default_seed: DEFAULT_DP_SEED,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> DataSpecResult<()> {
        if self.schema_sample_rows == 0 {
            return Err(DataSpecError::configuration_with_key(
                "schema_sample_rows must be at least 1",
                "execution.schema_sample_rows",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_routing_covers_pandas() {
        let routing = RoutingConfig::builtin();
        assert!(routing.symbol("pandas", "pd_getitem").is_some());
        assert!(routing.symbol("pandas", "pd_unknown").is_none());
        assert!(routing.validate().is_ok());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[routing.pandas]
pd_getitem = "pandas::pd_getitem"

[execution]
schema_sample_rows = 3
default_seed = 42

[logging]
default_level = "debug"
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.execution.schema_sample_rows, 3);
        assert_eq!(config.routing.symbol("pandas", "pd_getitem"), Some("pandas::pd_getitem"));
        assert!(config.routing.symbol("pandas", "pd_merge").is_none());
        assert_eq!(config.logging.default_level, "debug");
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"routing": {{"pandas": {{"pd_shape": "pandas::pd_shape"}}}}, "execution": {{"schema_sample_rows": 2, "default_seed": 1}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.execution.default_seed, 1);
        assert_eq!(config.routing.symbol("pandas", "pd_shape"), Some("pandas::pd_shape"));
    }

    #[test]
    fn test_zero_sample_rows_rejected() {
        let config = EngineConfig {
            execution: ExecutionConfig {
                schema_sample_rows: 0,
                default_seed: 0,
            },
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DataSpecError::Configuration { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::from_file("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, DataSpecError::Io(_)));
    }
}
