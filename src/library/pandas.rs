//! Built-in tabular operators, routed under the `pandas` library.
//!
//! | op | kind | PEP arguments | token preserving |
//! |---|---|---|---|
//! | `pd_getitem(dataframe, key)` | PEP | `{dataframe}` | when `key` is a literal |
//! | `pd_head(dataframe, n=5)` | PEP | `{dataframe}` | no |
//! | `pd_add(a, b)` | PEP | `{a}`, `{b}`, `{a, b}` | yes |
//! | `pd_merge(left, right, on)` | plain | | |
//! | `pd_shape(dataframe)` | plain | | |
//! | `pd_sum(dataframe)` | plain | | |
//! | `pd_shape_dp(dataframe)` | DP, replaces `pd_shape` | `{dataframe}` | |

use crate::constants::{DEFAULT_DP_SEED, PANDAS_LIBRARY};
use crate::dataspec::Arg;
use crate::dp::{laplace_noise, DpParameters, PrivateQuery};
use crate::error::{DataSpecError, DataSpecResult};
use crate::external_op::{
    BoundArguments, DpOp, OpImplementation, Param, PepOp, PlainOp, Signature, Symbol, SymbolTable,
    SyncDpFunction, SyncFunction, Value,
};
use crate::protection::ProtectionTable;
use crate::tabular::{Column, Series, Table, Tabular, TabularVariant};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Number, Value as JsonValue};
use std::sync::Arc;

/// Operators of the library, as routed by default.
pub const OP_NAMES: [&str; 7] = [
    "pd_getitem",
    "pd_head",
    "pd_add",
    "pd_merge",
    "pd_shape",
    "pd_sum",
    "pd_shape_dp",
];

/// Symbol name under which an operator is registered.
pub fn symbol(op_name: &str) -> String {
    format!("{}::{}", PANDAS_LIBRARY, op_name)
}

fn transform_id(op_name: &str) -> String {
    format!("{}.{}", PANDAS_LIBRARY, op_name)
}

/// Symbol table of every operator in [`OP_NAMES`].
pub fn symbols() -> SymbolTable {
    SymbolTable::new()
        .with(symbol("pd_getitem"), getitem_op())
        .with(symbol("pd_head"), head_op())
        .with(symbol("pd_add"), add_op())
        .with(symbol("pd_merge"), merge_op())
        .with(
            symbol("pd_shape"),
            Symbol::Function {
                signature: Signature::new(vec![Param::required("dataframe")]),
                function: Arc::new(SyncFunction(shape)),
            },
        )
        .with(
            symbol("pd_sum"),
            Symbol::Function {
                signature: Signature::new(vec![Param::required("dataframe")]),
                function: Arc::new(SyncFunction(sum)),
            },
        )
        .with(symbol("pd_shape_dp"), shape_dp_op())
}

fn getitem_op() -> OpImplementation {
    let signature = Signature::new(vec![
        Param::required("dataframe").accepting(&[TabularVariant::Frame]),
        Param::required("key"),
    ]);
    OpImplementation::Pep(
        PepOp::new(signature, Arc::new(SyncFunction(getitem)))
            .allow(["dataframe"])
            .token_preserving(|args: &BoundArguments<Arg>| matches!(args.get("key"), Some(Arg::Literal(_)))),
    )
}

fn head_op() -> OpImplementation {
    let signature = Signature::new(vec![
        Param::required("dataframe"),
        Param::optional("n", json!(5)),
    ]);
    OpImplementation::Pep(PepOp::new(signature, Arc::new(SyncFunction(head))).allow(["dataframe"]))
}

fn add_op() -> OpImplementation {
    let signature = Signature::new(vec![Param::required("a"), Param::required("b")]);
    OpImplementation::Pep(
        PepOp::new(signature, Arc::new(SyncFunction(add)))
            .allow(["a"])
            .allow(["b"])
            .allow(["a", "b"])
            .always_token_preserving(),
    )
}

fn merge_op() -> OpImplementation {
    let signature = Signature::new(vec![
        Param::required("left").accepting(&[TabularVariant::Frame]),
        Param::required("right").accepting(&[TabularVariant::Frame]),
        Param::required("on"),
    ]);
    OpImplementation::Plain(PlainOp::new(signature, Arc::new(SyncFunction(merge))))
}

fn shape_dp_op() -> OpImplementation {
    let signature = Signature::new(vec![Param::required("dataframe")]);
    OpImplementation::Dp(
        DpOp::new(signature, Arc::new(SyncDpFunction(shape_dp)))
            .allow(["dataframe"])
            .equivalent_of(transform_id("pd_shape")),
    )
}

fn getitem(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    let frame = frame_argument(&args, "dataframe")?;
    match args.require("key")? {
        Value::Literal(JsonValue::String(name)) => {
            let column = frame
                .column(name)
                .cloned()
                .ok_or_else(|| DataSpecError::argument("key", format!("no column named '{}'", name)))?;
            Ok(Tabular::Series(Series::from_column(frame.index().to_vec(), column)?).into())
        }
        Value::Literal(JsonValue::Array(names)) => {
            let names = names
                .iter()
                .map(|name| {
                    name.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| DataSpecError::argument("key", "column names must be strings"))
                })
                .collect::<DataSpecResult<Vec<_>>>()?;
            Ok(Tabular::Frame(frame.select(&names)?).into())
        }
        Value::Tabular(Tabular::Series(mask)) => {
            if mask.index != frame.index() {
                return Err(DataSpecError::argument("key", "boolean mask is not aligned with the frame"));
            }
            let mask = mask
                .values
                .iter()
                .map(|v| {
                    v.as_bool()
                        .ok_or_else(|| DataSpecError::argument("key", "mask values must be booleans"))
                })
                .collect::<DataSpecResult<Vec<_>>>()?;
            Ok(Tabular::Frame(frame.filter(&mask)?).into())
        }
        other => Err(DataSpecError::argument(
            "key",
            format!("cannot index a frame with a {}", other.type_name()),
        )),
    }
}

fn head(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    let data = args.tabular("dataframe")?;
    let n = args
        .literal("n")?
        .as_u64()
        .ok_or_else(|| DataSpecError::argument("n", "expected a non-negative integer"))?;
    Ok(data.head(n as usize).into())
}

fn add(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    match (args.require("a")?, args.require("b")?) {
        (Value::Literal(a), Value::Literal(b)) => Ok(Value::Literal(add_cells(a, b)?)),
        (Value::Tabular(a), Value::Literal(b)) => map_cells(a, |cell| add_cells(cell, b)),
        (Value::Literal(a), Value::Tabular(b)) => map_cells(b, |cell| add_cells(a, cell)),
        (Value::Tabular(a), Value::Tabular(b)) => add_tabular(a, b),
    }
}

fn add_tabular(a: &Tabular, b: &Tabular) -> DataSpecResult<Value> {
    if a.index() != b.index() {
        return Err(DataSpecError::argument("b", "operands are not aligned"));
    }
    match (a, b) {
        (Tabular::Series(a), Tabular::Series(b)) => {
            let values = add_columns(&a.values, &b.values)?;
            Ok(Tabular::Series(Series::with_index(a.name.clone(), a.index.clone(), values)?).into())
        }
        (Tabular::Frame(a), Tabular::Frame(b)) => {
            let columns = a
                .columns()
                .iter()
                .map(|left| {
                    let right = b.column(&left.name).ok_or_else(|| {
                        DataSpecError::argument("b", format!("no column named '{}'", left.name))
                    })?;
                    Ok(Column::new(left.name.clone(), add_columns(&left.values, &right.values)?))
                })
                .collect::<DataSpecResult<Vec<_>>>()?;
            Ok(Tabular::Frame(Table::with_index(a.index().to_vec(), columns)?).into())
        }
        _ => Err(DataSpecError::argument("b", "cannot add a series and a frame")),
    }
}

fn add_columns(a: &[JsonValue], b: &[JsonValue]) -> DataSpecResult<Vec<JsonValue>> {
    a.iter().zip(b).map(|(x, y)| add_cells(x, y)).collect()
}

fn map_cells(
    data: &Tabular,
    f: impl Fn(&JsonValue) -> DataSpecResult<JsonValue>,
) -> DataSpecResult<Value> {
    let map_values = |values: &[JsonValue]| values.iter().map(&f).collect::<DataSpecResult<Vec<_>>>();
    let mapped = match data {
        Tabular::Series(series) => Tabular::Series(Series::with_index(
            series.name.clone(),
            series.index.clone(),
            map_values(&series.values)?,
        )?),
        Tabular::Frame(table) => {
            let columns = table
                .columns()
                .iter()
                .map(|c| Ok(Column::new(c.name.clone(), map_values(&c.values)?)))
                .collect::<DataSpecResult<Vec<_>>>()?;
            Tabular::Frame(Table::with_index(table.index().to_vec(), columns)?)
        }
    };
    Ok(mapped.into())
}

/// Adds two cells: nulls propagate, integers stay integers unless they
/// overflow, strings concatenate.
fn add_cells(a: &JsonValue, b: &JsonValue) -> DataSpecResult<JsonValue> {
    match (a, b) {
        (JsonValue::Null, _) | (_, JsonValue::Null) => Ok(JsonValue::Null),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                if let Some(sum) = x.checked_add(y) {
                    return Ok(JsonValue::from(sum));
                }
            }
            let sum = x.as_f64().unwrap_or(f64::NAN) + y.as_f64().unwrap_or(f64::NAN);
            Ok(Number::from_f64(sum).map(JsonValue::Number).unwrap_or(JsonValue::Null))
        }
        (JsonValue::String(x), JsonValue::String(y)) => Ok(JsonValue::String(format!("{}{}", x, y))),
        _ => Err(DataSpecError::argument("b", format!("cannot add {} and {}", a, b))),
    }
}

/// Inner join on one or several key columns. Overlapping non-key columns
/// get `_x` / `_y` suffixes; the result has a fresh index.
fn merge(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    let left = frame_argument(&args, "left")?;
    let right = frame_argument(&args, "right")?;
    let on: Vec<String> = match args.literal("on")? {
        JsonValue::String(name) => vec![name.clone()],
        JsonValue::Array(names) => names
            .iter()
            .filter_map(|n| n.as_str().map(str::to_string))
            .collect(),
        other => {
            return Err(DataSpecError::argument(
                "on",
                format!("expected a column name or a list of names, got {}", other),
            ))
        }
    };
    if on.is_empty() {
        return Err(DataSpecError::argument("on", "no key column given"));
    }
    let left_keys = key_columns(left, &on, "left")?;
    let right_keys = key_columns(right, &on, "right")?;

    let mut pairs = Vec::new();
    for l in 0..left.num_rows() {
        for r in 0..right.num_rows() {
            if left_keys.iter().zip(&right_keys).all(|(lk, rk)| lk.values[l] == rk.values[r]) {
                pairs.push((l, r));
            }
        }
    }

    let pick = |column: &Column, name: String, rows: &mut dyn Iterator<Item = usize>| {
        Column::with_type(
            name,
            column.data_type.clone(),
            rows.map(|row| column.values[row].clone()).collect(),
        )
    };
    let mut columns = Vec::new();
    for column in left.columns() {
        let name = if !on.contains(&column.name) && right.column(&column.name).is_some() {
            format!("{}_x", column.name)
        } else {
            column.name.clone()
        };
        columns.push(pick(column, name, &mut pairs.iter().map(|(l, _)| *l)));
    }
    for column in right.columns().iter().filter(|c| !on.contains(&c.name)) {
        let name = if left.column(&column.name).is_some() {
            format!("{}_y", column.name)
        } else {
            column.name.clone()
        };
        columns.push(pick(column, name, &mut pairs.iter().map(|(_, r)| *r)));
    }
    Ok(Tabular::Frame(Table::new(columns)?).into())
}

fn key_columns<'a>(table: &'a Table, on: &[String], side: &str) -> DataSpecResult<Vec<&'a Column>> {
    on.iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| DataSpecError::argument(side, format!("no key column '{}'", name)))
        })
        .collect()
}

fn shape(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    let data = args.tabular("dataframe")?;
    Ok(Value::Literal(shape_of(data, data.num_rows() as u64)))
}

fn shape_of(data: &Tabular, rows: u64) -> JsonValue {
    match data {
        Tabular::Frame(table) => json!([rows, table.num_columns()]),
        Tabular::Series(_) => json!([rows]),
    }
}

/// Column sums of a frame (numeric columns only) or the sum of a series.
fn sum(args: BoundArguments<Value>) -> DataSpecResult<Value> {
    let sum = match args.tabular("dataframe")? {
        Tabular::Series(series) => sum_values(&series.values),
        Tabular::Frame(table) => {
            let sums: Map<String, JsonValue> = table
                .columns()
                .iter()
                .filter(|c| c.data_type.is_numeric())
                .map(|c| (c.name.clone(), sum_values(&c.values)))
                .collect();
            JsonValue::Object(sums)
        }
    };
    Ok(Value::Literal(sum))
}

fn sum_values(values: &[JsonValue]) -> JsonValue {
    let numbers: Vec<&Number> = values.iter().filter_map(JsonValue::as_number).collect();
    let ints: Option<Vec<i64>> = numbers.iter().map(|n| n.as_i64()).collect();
    if let Some(total) = ints.and_then(|ints| ints.into_iter().try_fold(0i64, i64::checked_add)) {
        return JsonValue::from(total);
    }
    let total: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
    Number::from_f64(total).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

/// Shape with a Laplace-noised row count. Sensitivity is the largest number
/// of rows a single protected user contributes.
fn shape_dp(
    args: BoundArguments<Value>,
    protection: ProtectionTable,
    parameters: DpParameters,
) -> DataSpecResult<(Value, PrivateQuery)> {
    parameters.validate()?;
    let data = args.tabular("dataframe")?;
    let mut rng = StdRng::seed_from_u64(parameters.seed.unwrap_or(DEFAULT_DP_SEED));
    let scale = protection.max_multiplicity().max(1) as f64 / parameters.epsilon;
    let noisy = (data.num_rows() as f64 + laplace_noise(&mut rng, scale))
        .round()
        .max(0.0) as u64;
    Ok((
        Value::Literal(shape_of(data, noisy)),
        PrivateQuery::basic("laplace", parameters.epsilon, 0.0),
    ))
}

fn frame_argument<'a>(args: &'a BoundArguments<Value>, name: &str) -> DataSpecResult<&'a Table> {
    args.tabular(name)?
        .as_frame()
        .ok_or_else(|| DataSpecError::argument(name, "expected a frame, got a series"))
}
