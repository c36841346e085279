//! Error handling for dataspec evaluation.
//!
//! Only the evaluation step raises errors. The applicability predicates
//! (`pep_token`, `is_dp_applicable`) encode misalignment as `None`/`false`
//! and never produce a [`DataSpecError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for dataspec operations.
pub type DataSpecResult<T> = Result<T, DataSpecError>;

/// Error type for registry resolution and dataspec evaluation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataSpecError {
    /// The op name is absent from the routing table of its library
    #[error("Unknown operator: {transform_id}")]
    UnknownOperator { transform_id: String },

    /// Transform id is not of the form `<library>.<op_name>`
    #[error("Invalid transform id: {0}")]
    InvalidTransformId(String),

    /// Routing table or configuration file is inconsistent
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        config_key: Option<String>,
    },

    /// A PEP or DP dataspec found no protection among its arguments
    #[error("No protection found for dataspec {dataspec}")]
    MissingProtection { dataspec: String },

    /// A PEP or DP dataspec found several distinct protections
    #[error("Dataspec {dataspec} received {distinct} distinct protections")]
    InconsistentProtection { dataspec: String, distinct: usize },

    /// A data function result cannot be converted to a tabular value
    #[error("Transform {transform_id} returned an unsupported result type: {found}")]
    UnsupportedResultType { transform_id: String, found: String },

    /// DP budget rejected by validation
    #[error("Invalid privacy budget: {message}")]
    InvalidBudget { message: String },

    /// Arguments do not match the operator signature
    #[error("Invalid arguments for {transform_id}: {message}")]
    Argument {
        transform_id: String,
        message: String,
    },

    /// The data function itself failed
    #[error("Transform execution failed: {transform_id}: {message}")]
    Execution {
        transform_id: String,
        message: String,
    },

    /// Malformed tabular value or missing column/row
    #[error("Tabular error: {0}")]
    Tabular(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(String),
}

/// Error categories used for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Configuration,
    Protection,
    Budget,
    Argument,
    Execution,
    Serialization,
    Io,
}

impl DataSpecError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: None,
        }
    }

    /// Creates a configuration error pointing at a config key.
    pub fn configuration_with_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            config_key: Some(key.into()),
        }
    }

    /// Creates an unknown operator error.
    pub fn unknown_operator(transform_id: impl Into<String>) -> Self {
        Self::UnknownOperator {
            transform_id: transform_id.into(),
        }
    }

    /// Creates an argument error.
    pub fn argument(transform_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Argument {
            transform_id: transform_id.into(),
            message: message.into(),
        }
    }

    /// Creates an execution error.
    pub fn execution(transform_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            transform_id: transform_id.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported result type error.
    pub fn unsupported_result(transform_id: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnsupportedResultType {
            transform_id: transform_id.into(),
            found: found.into(),
        }
    }

    /// Creates a budget validation error.
    pub fn invalid_budget(message: impl Into<String>) -> Self {
        Self::InvalidBudget {
            message: message.into(),
        }
    }

    /// Creates a tabular error.
    pub fn tabular(message: impl Into<String>) -> Self {
        Self::Tabular(message.into())
    }

    /// Gets the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownOperator { .. }
            | Self::InvalidTransformId(_)
            | Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::MissingProtection { .. } | Self::InconsistentProtection { .. } => {
                ErrorCategory::Protection
            }
            Self::InvalidBudget { .. } => ErrorCategory::Budget,
            Self::Argument { .. } => ErrorCategory::Argument,
            Self::UnsupportedResultType { .. } | Self::Execution { .. } | Self::Tabular(_) => {
                ErrorCategory::Execution
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether an outer scheduler may retry the failed evaluation.
    ///
    /// Nothing raised by this crate is retryable from the inside; only IO
    /// failures while loading configuration may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<serde_json::Error> for DataSpecError {
    fn from(error: serde_json::Error) -> Self {
        DataSpecError::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for DataSpecError {
    fn from(error: toml::de::Error) -> Self {
        DataSpecError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for DataSpecError {
    fn from(error: std::io::Error) -> Self {
        DataSpecError::Io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            DataSpecError::unknown_operator("pandas.nope").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            DataSpecError::MissingProtection {
                dataspec: "ds".to_string()
            }
            .category(),
            ErrorCategory::Protection
        );
        assert_eq!(
            DataSpecError::invalid_budget("epsilon must be positive").category(),
            ErrorCategory::Budget
        );
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!DataSpecError::unknown_operator("pandas.nope").is_retryable());
        assert!(!DataSpecError::InconsistentProtection {
            dataspec: "ds".to_string(),
            distinct: 2
        }
        .is_retryable());
        assert!(DataSpecError::Io("disk".to_string()).is_retryable());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: DataSpecError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        match err {
            DataSpecError::Serialization(message) => assert!(!message.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }
}
