//! Common test utilities and fixtures for dataspec integration tests
//!
//! Provides a registry with the built-in libraries plus a small `test`
//! library, and sample datasets with and without protection.

#![allow(dead_code)]

use dataspec::dataspec::{Arg, DataSpec, DataSpecKind, Source};
use dataspec::dp::{DpParameters, PrivateQuery};
use dataspec::error::DataSpecResult;
use dataspec::external_op::{
    BoundArguments, DpOp, OpImplementation, OpRegistry, Param, Signature, Symbol, SyncDpFunction,
    SyncFunction, Value,
};
use dataspec::library;
use dataspec::protection::ProtectionTable;
use dataspec::tabular::{Series, Table};
use dataspec::RoutingConfig;
use serde_json::json;
use std::sync::Arc;

/// Installs a test logger once per test binary.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Built-in operators plus:
///
/// * `test.pair_count(a, b)`: plain, with DP equivalent
///   `test.pair_count_dp` allowing `{a, b}`
/// * `test.constant(x)`: plain, always returns the literal `5`
pub fn registry() -> Arc<OpRegistry> {
    let routing = RoutingConfig::builtin()
        .route("test", "pair_count", "test::pair_count")
        .route("test", "pair_count_dp", "test::pair_count_dp")
        .route("test", "constant", "test::constant");

    let mut symbols = library::builtin_symbols();
    symbols.insert(
        "test::pair_count",
        Symbol::Function {
            signature: Signature::new(vec![Param::required("a"), Param::required("b")]),
            function: Arc::new(SyncFunction(|args: BoundArguments<Value>| -> DataSpecResult<Value> {
                Ok(Value::Literal(json!(args.tabular("a")?.num_rows() + args.tabular("b")?.num_rows())))
            })),
        },
    );
    symbols.insert(
        "test::pair_count_dp",
        OpImplementation::Dp(
            DpOp::new(
                Signature::new(vec![Param::required("a"), Param::required("b")]),
                Arc::new(SyncDpFunction(
                    |_: BoundArguments<Value>,
                     protection: ProtectionTable,
                     parameters: DpParameters|
                     -> DataSpecResult<(Value, PrivateQuery)> {
                        Ok((
                            Value::Literal(json!(protection.num_rows())),
                            PrivateQuery::basic("count", parameters.epsilon, parameters.delta),
                        ))
                    },
                )),
            )
            .allow(["a", "b"])
            .equivalent_of("test.pair_count"),
        ),
    );
    symbols.insert(
        "test::constant",
        Symbol::Function {
            signature: Signature::new(vec![Param::required("x")]),
            function: Arc::new(SyncFunction(|_: BoundArguments<Value>| -> DataSpecResult<Value> {
                Ok(Value::Literal(json!(5)))
            })),
        },
    );

    Arc::new(OpRegistry::new(routing, symbols).expect("test registry"))
}

pub fn people() -> Table {
    Table::from_records(&json!([
        {"id": 1, "age": 31, "city": "Paris"},
        {"id": 2, "age": 45, "city": "Lyon"},
        {"id": 3, "age": 27, "city": "Paris"},
    ]))
    .expect("people table")
}

pub fn people_protection() -> ProtectionTable {
    ProtectionTable::for_users(["u1", "u2", "u3"])
}

/// Protected source of [`people`], one user per row.
pub fn protected_people() -> Arc<DataSpec> {
    DataSpec::source(Source::protected(people(), people_protection()).expect("aligned protection"))
}

pub fn public_people() -> Arc<DataSpec> {
    DataSpec::source(Source::public(people()))
}

/// Public boolean series aligned with [`people`].
pub fn public_mask(values: [bool; 3]) -> Arc<DataSpec> {
    let values = values.iter().map(|&v| json!(v)).collect();
    DataSpec::source(Source::public(Series::new("mask", values)))
}

pub fn dataset(registry: &Arc<OpRegistry>, transform_id: &str, args: Vec<Arg>) -> Arc<DataSpec> {
    DataSpec::apply(registry, DataSpecKind::Dataset, transform_id, args, Vec::new())
        .expect("dataset dataspec")
}

pub fn scalar(registry: &Arc<OpRegistry>, transform_id: &str, args: Vec<Arg>) -> Arc<DataSpec> {
    DataSpec::apply(registry, DataSpecKind::Scalar, transform_id, args, Vec::new())
        .expect("scalar dataspec")
}
