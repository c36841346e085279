//! Operator implementations and their privacy capabilities.
//!
//! Every operator is one of three variants:
//!
//! * [`PlainOp`]: a data function only; never PEP, never DP.
//! * [`PepOp`]: may preserve protected-entity alignment for the argument
//!   combinations it allows, and may preserve its input token.
//! * [`DpOp`]: consumes a privacy budget, receives the protection of its
//!   input and reports a [`PrivateQuery`]; may be the DP-equivalent of some
//!   other operator.

use crate::dataspec::Arg;
use crate::dp::{DpParameters, PrivateQuery};
use crate::error::{DataSpecError, DataSpecResult};
use crate::protection::ProtectionTable;
use crate::tabular::{Tabular, TabularVariant};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A concrete argument value handed to a data function.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(JsonValue),
    Tabular(Tabular),
}

impl Value {
    pub fn as_literal(&self) -> Option<&JsonValue> {
        match self {
            Value::Literal(value) => Some(value),
            Value::Tabular(_) => None,
        }
    }

    pub fn as_tabular(&self) -> Option<&Tabular> {
        match self {
            Value::Tabular(tabular) => Some(tabular),
            Value::Literal(_) => None,
        }
    }

    /// Short description used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Literal(JsonValue::Null) => "null",
            Value::Literal(JsonValue::Bool(_)) => "bool",
            Value::Literal(JsonValue::Number(_)) => "number",
            Value::Literal(JsonValue::String(_)) => "string",
            Value::Literal(JsonValue::Array(_)) => "array",
            Value::Literal(JsonValue::Object(_)) => "object",
            Value::Tabular(Tabular::Series(_)) => "series",
            Value::Tabular(Tabular::Frame(_)) => "frame",
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Literal(value)
    }
}

impl From<Tabular> for Value {
    fn from(tabular: Tabular) -> Self {
        Value::Tabular(tabular)
    }
}

/// One declared parameter of an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<JsonValue>,
    /// Tabular shapes accepted by this parameter; `None` accepts anything.
    pub accepts: Option<Vec<TabularVariant>>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            accepts: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: JsonValue) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
            accepts: None,
        }
    }

    pub fn accepting(mut self, variants: &[TabularVariant]) -> Self {
        self.accepts = Some(variants.to_vec());
        self
    }
}

/// Arguments bound to parameter names, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArguments<T> {
    values: Vec<(String, T)>,
}

impl<T> BoundArguments<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl BoundArguments<Value> {
    /// Fetches a required argument or fails with an argument error.
    pub fn require(&self, name: &str) -> DataSpecResult<&Value> {
        self.get(name)
            .ok_or_else(|| DataSpecError::argument(name, format!("missing argument '{}'", name)))
    }

    pub fn tabular(&self, name: &str) -> DataSpecResult<&Tabular> {
        let value = self.require(name)?;
        value.as_tabular().ok_or_else(|| {
            DataSpecError::argument(
                name,
                format!("expected a tabular value, got {}", value.type_name()),
            )
        })
    }

    pub fn literal(&self, name: &str) -> DataSpecResult<&JsonValue> {
        let value = self.require(name)?;
        value.as_literal().ok_or_else(|| {
            DataSpecError::argument(
                name,
                format!("expected a literal value, got {}", value.type_name()),
            )
        })
    }
}

/// Introspectable parameter list of an operator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Maps positional arguments to names and merges keyword arguments.
    ///
    /// Fails on surplus positional arguments, unknown or duplicate keywords,
    /// and missing parameters without a default.
    pub fn bind<T>(&self, args: Vec<T>, kwargs: BTreeMap<String, T>) -> Result<BoundArguments<T>, String> {
        if args.len() > self.params.len() {
            return Err(format!(
                "takes {} positional arguments but {} were given",
                self.params.len(),
                args.len()
            ));
        }
        let mut by_name: BTreeMap<String, T> = BTreeMap::new();
        for (param, value) in self.params.iter().zip(args) {
            by_name.insert(param.name.clone(), value);
        }
        for (name, value) in kwargs {
            if !self.params.iter().any(|p| p.name == name) {
                return Err(format!("unexpected keyword argument '{}'", name));
            }
            if by_name.insert(name.clone(), value).is_some() {
                return Err(format!("multiple values for argument '{}'", name));
            }
        }
        let mut values = Vec::with_capacity(by_name.len());
        for param in &self.params {
            match by_name.remove(&param.name) {
                Some(value) => values.push((param.name.clone(), value)),
                None if param.default.is_some() => {}
                None => return Err(format!("missing required argument '{}'", param.name)),
            }
        }
        Ok(BoundArguments { values })
    }

    /// Binds evaluated values, fills defaults and checks tabular shapes.
    pub fn bind_values(
        &self,
        transform_id: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> DataSpecResult<BoundArguments<Value>> {
        let bound = self
            .bind(args, kwargs)
            .map_err(|message| DataSpecError::argument(transform_id, message))?;
        let mut provided = bound.values.into_iter().peekable();
        let mut values = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = match provided.peek() {
                Some((name, _)) if *name == param.name => provided.next().map(|(_, v)| v),
                _ => param.default.clone().map(Value::Literal),
            };
            let Some(value) = value else { continue };
            if let (Some(accepts), Value::Tabular(tabular)) = (&param.accepts, &value) {
                if !accepts.contains(&tabular.variant()) {
                    return Err(DataSpecError::argument(
                        transform_id,
                        format!(
                            "argument '{}' does not accept a {:?}",
                            param.name,
                            tabular.variant()
                        ),
                    ));
                }
            }
            values.push((param.name.clone(), value));
        }
        Ok(BoundArguments { values })
    }
}

/// Computes a plain or PEP operator's result.
#[async_trait]
pub trait DataFunction: Send + Sync {
    async fn call(&self, args: BoundArguments<Value>) -> DataSpecResult<Value>;
}

/// Computes a DP operator's result and reports what it spent.
#[async_trait]
pub trait DpDataFunction: Send + Sync {
    async fn call(
        &self,
        args: BoundArguments<Value>,
        protection: ProtectionTable,
        parameters: DpParameters,
    ) -> DataSpecResult<(Value, PrivateQuery)>;
}

/// Adapter turning a synchronous closure into a [`DataFunction`].
pub struct SyncFunction<F>(pub F);

#[async_trait]
impl<F> DataFunction for SyncFunction<F>
where
    F: Fn(BoundArguments<Value>) -> DataSpecResult<Value> + Send + Sync,
{
    async fn call(&self, args: BoundArguments<Value>) -> DataSpecResult<Value> {
        (self.0)(args)
    }
}

/// Adapter turning a synchronous closure into a [`DpDataFunction`].
pub struct SyncDpFunction<F>(pub F);

#[async_trait]
impl<F> DpDataFunction for SyncDpFunction<F>
where
    F: Fn(BoundArguments<Value>, ProtectionTable, DpParameters) -> DataSpecResult<(Value, PrivateQuery)>
        + Send
        + Sync,
{
    async fn call(
        &self,
        args: BoundArguments<Value>,
        protection: ProtectionTable,
        parameters: DpParameters,
    ) -> DataSpecResult<(Value, PrivateQuery)> {
        (self.0)(args, protection, parameters)
    }
}

/// Decides from the call arguments whether output rows keep input alignment.
pub type TokenPreservingFn = Arc<dyn Fn(&BoundArguments<Arg>) -> bool + Send + Sync>;

pub struct PlainOp {
    pub signature: Signature,
    pub function: Arc<dyn DataFunction>,
}

impl PlainOp {
    pub fn new(signature: Signature, function: Arc<dyn DataFunction>) -> Self {
        Self {
            signature,
            function,
        }
    }
}

pub struct PepOp {
    pub signature: Signature,
    pub function: Arc<dyn DataFunction>,
    pub allowed_pep_args: Vec<BTreeSet<String>>,
    token_preserving: Option<TokenPreservingFn>,
}

impl PepOp {
    pub fn new(signature: Signature, function: Arc<dyn DataFunction>) -> Self {
        Self {
            signature,
            function,
            allowed_pep_args: Vec::new(),
            token_preserving: None,
        }
    }

    /// Allows one combination of PEP argument names.
    pub fn allow<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.allowed_pep_args
            .push(names.into_iter().map(str::to_string).collect());
        self
    }

    pub fn token_preserving(
        mut self,
        predicate: impl Fn(&BoundArguments<Arg>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.token_preserving = Some(Arc::new(predicate));
        self
    }

    /// Declares the operator token preserving for every call.
    pub fn always_token_preserving(self) -> Self {
        self.token_preserving(|_| true)
    }

    pub fn is_token_preserving(&self, args: &BoundArguments<Arg>) -> bool {
        self.token_preserving
            .as_ref()
            .map(|predicate| predicate(args))
            .unwrap_or(false)
    }
}

pub struct DpOp {
    pub signature: Signature,
    pub function: Arc<dyn DpDataFunction>,
    pub allowed_pep_args: Vec<BTreeSet<String>>,
    /// Transform id of the operator this one may replace.
    pub equivalent_of: Option<String>,
}

impl DpOp {
    pub fn new(signature: Signature, function: Arc<dyn DpDataFunction>) -> Self {
        Self {
            signature,
            function,
            allowed_pep_args: Vec::new(),
            equivalent_of: None,
        }
    }

    pub fn allow<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.allowed_pep_args
            .push(names.into_iter().map(str::to_string).collect());
        self
    }

    pub fn equivalent_of(mut self, transform_id: impl Into<String>) -> Self {
        self.equivalent_of = Some(transform_id.into());
        self
    }
}

/// Privacy capabilities of a registered operator.
pub enum OpImplementation {
    Plain(PlainOp),
    Pep(PepOp),
    Dp(DpOp),
}

impl OpImplementation {
    pub fn signature(&self) -> &Signature {
        match self {
            OpImplementation::Plain(op) => &op.signature,
            OpImplementation::Pep(op) => &op.signature,
            OpImplementation::Dp(op) => &op.signature,
        }
    }

    /// Allowed PEP argument-name combinations; empty for plain operators.
    pub fn allowed_pep_args(&self) -> &[BTreeSet<String>] {
        match self {
            OpImplementation::Plain(_) => &[],
            OpImplementation::Pep(op) => &op.allowed_pep_args,
            OpImplementation::Dp(op) => &op.allowed_pep_args,
        }
    }

    pub fn is_pep(&self) -> bool {
        matches!(self, OpImplementation::Pep(_))
    }

    pub fn is_dp(&self) -> bool {
        matches!(self, OpImplementation::Dp(_))
    }

    pub fn is_token_preserving(&self, args: &BoundArguments<Arg>) -> bool {
        match self {
            OpImplementation::Pep(op) => op.is_token_preserving(args),
            _ => false,
        }
    }

    pub fn dp_equivalent_of(&self) -> Option<&str> {
        match self {
            OpImplementation::Dp(op) => op.equivalent_of.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Debug for OpImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            OpImplementation::Plain(_) => "Plain",
            OpImplementation::Pep(_) => "Pep",
            OpImplementation::Dp(_) => "Dp",
        };
        f.debug_struct(variant)
            .field("params", &self.signature().param_names())
            .field("allowed_pep_args", &self.allowed_pep_args())
            .finish()
    }
}
