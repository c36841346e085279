//! Operator registry.
//!
//! The registry is populated once from an explicit routing table and a table
//! of implementation symbols. String lookup only happens where a persisted
//! transform id has to be resolved.

use super::implementation::{DataFunction, OpImplementation, PlainOp, Signature};
use crate::config::RoutingConfig;
use crate::dataspec::Transform;
use crate::error::{DataSpecError, DataSpecResult};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

/// What a routing entry points at.
pub enum Symbol {
    /// A bare data function, registered as a plain operator.
    Function {
        signature: Signature,
        function: Arc<dyn DataFunction>,
    },
    Implementation(OpImplementation),
}

impl From<OpImplementation> for Symbol {
    fn from(implementation: OpImplementation) -> Self {
        Symbol::Implementation(implementation)
    }
}

/// Named implementation symbols available to routing tables.
#[derive(Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, symbol: impl Into<Symbol>) {
        self.symbols.insert(name.into(), symbol.into());
    }

    pub fn with(mut self, name: impl Into<String>, symbol: impl Into<Symbol>) -> Self {
        self.insert(name, symbol);
        self
    }

    fn take(&mut self, name: &str) -> Option<Symbol> {
        self.symbols.remove(name)
    }
}

/// Resolves transform ids to typed operator implementations.
pub struct OpRegistry {
    routing: RoutingConfig,
    implementations: HashMap<String, Arc<OpImplementation>>,
    dp_equivalents: HashMap<String, String>,
    dp_sources: HashMap<String, String>,
}

impl OpRegistry {
    /// Builds the registry from a routing table and the symbols it names.
    ///
    /// Fails when a route names a missing symbol, when two routes share a
    /// symbol, or when a DP operator claims to replace an unknown operator.
    pub fn new(routing: RoutingConfig, mut symbols: SymbolTable) -> DataSpecResult<Self> {
        routing.validate()?;
        let mut implementations = HashMap::new();
        for (library, ops) in &routing.libraries {
            for (op_name, symbol_name) in ops {
                let symbol = symbols.take(symbol_name).ok_or_else(|| {
                    DataSpecError::configuration_with_key(
                        format!("symbol '{}' is not defined or routed twice", symbol_name),
                        format!("routing.{}.{}", library, op_name),
                    )
                })?;
                let implementation = match symbol {
                    Symbol::Implementation(implementation) => implementation,
                    Symbol::Function {
                        signature,
                        function,
                    } => OpImplementation::Plain(PlainOp::new(signature, function)),
                };
                implementations.insert(format!("{}.{}", library, op_name), Arc::new(implementation));
            }
        }

        let mut dp_equivalents = HashMap::new();
        let mut dp_sources = HashMap::new();
        for (dp_id, implementation) in &implementations {
            let Some(target) = implementation.dp_equivalent_of() else {
                continue;
            };
            if !implementations.contains_key(target) {
                return Err(DataSpecError::configuration(format!(
                    "{} is declared DP-equivalent of unknown operator {}",
                    dp_id, target
                )));
            }
            if let Some(previous) = dp_equivalents.insert(target.to_string(), dp_id.clone()) {
                return Err(DataSpecError::configuration(format!(
                    "{} has two DP equivalents: {} and {}",
                    target, previous, dp_id
                )));
            }
            dp_sources.insert(dp_id.clone(), target.to_string());
        }

        info!(
            "Operator registry ready: {} operators, {} DP equivalents",
            implementations.len(),
            dp_equivalents.len()
        );
        Ok(Self {
            routing,
            implementations,
            dp_equivalents,
            dp_sources,
        })
    }

    /// Registry of the built-in operator libraries.
    pub fn builtin() -> DataSpecResult<Self> {
        Self::new(RoutingConfig::builtin(), crate::library::builtin_symbols())
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Resolves `"<library>.<op_name>"` to its implementation.
    pub fn get_implementation(&self, transform_id: &str) -> DataSpecResult<Arc<OpImplementation>> {
        Transform::parse_id(transform_id)?;
        self.implementations
            .get(transform_id)
            .cloned()
            .ok_or_else(|| {
                debug!("No route for transform {}", transform_id);
                DataSpecError::unknown_operator(transform_id)
            })
    }

    /// Id of the DP operator that may replace `transform_id`.
    pub fn dp_equivalent_id(&self, transform_id: &str) -> Option<&str> {
        self.dp_equivalents.get(transform_id).map(String::as_str)
    }

    pub fn dp_equivalent(&self, transform_id: &str) -> Option<Arc<OpImplementation>> {
        self.dp_equivalent_id(transform_id)
            .and_then(|id| self.implementations.get(id))
            .cloned()
    }

    /// Id of the operator a DP operator is the equivalent of.
    pub fn non_dp_equivalent_id(&self, dp_transform_id: &str) -> Option<&str> {
        self.dp_sources.get(dp_transform_id).map(String::as_str)
    }

    pub fn transform_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.implementations.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external_op::implementation::{BoundArguments, Param, SyncFunction, Value};
    use serde_json::json;

    fn constant() -> Symbol {
        Symbol::Function {
            signature: Signature::new(vec![Param::required("x")]),
            function: Arc::new(SyncFunction(|_: BoundArguments<Value>| -> DataSpecResult<Value> {
                Ok(Value::Literal(json!(42)))
            })),
        }
    }

    #[test]
    fn test_bare_function_wrapped_as_plain() {
        let routing = RoutingConfig::empty().route("std", "constant", "std::constant");
        let registry =
            OpRegistry::new(routing, SymbolTable::new().with("std::constant", constant())).unwrap();
        let implementation = registry.get_implementation("std.constant").unwrap();
        assert!(matches!(*implementation, OpImplementation::Plain(_)));
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OpRegistry::builtin().unwrap();
        assert_eq!(
            registry.get_implementation("pandas.pd_nope").unwrap_err(),
            DataSpecError::unknown_operator("pandas.pd_nope")
        );
        assert!(matches!(
            registry.get_implementation("numpy.np_sum").unwrap_err(),
            DataSpecError::UnknownOperator { .. }
        ));
        assert!(matches!(
            registry.get_implementation("nodot").unwrap_err(),
            DataSpecError::InvalidTransformId(_)
        ));
    }

    #[test]
    fn test_missing_symbol_is_configuration_error() {
        let routing = RoutingConfig::empty().route("std", "constant", "std::missing");
        let err = OpRegistry::new(routing, SymbolTable::new()).err().unwrap();
        assert!(matches!(err, DataSpecError::Configuration { .. }));
    }

    #[test]
    fn test_builtin_dp_equivalents() {
        let registry = OpRegistry::builtin().unwrap();
        assert_eq!(registry.dp_equivalent_id("pandas.pd_shape"), Some("pandas.pd_shape_dp"));
        assert_eq!(registry.non_dp_equivalent_id("pandas.pd_shape_dp"), Some("pandas.pd_shape"));
        assert!(registry.dp_equivalent("pandas.pd_merge").is_none());
        assert!(registry.dp_equivalent("pandas.pd_shape").unwrap().is_dp());
    }
}
