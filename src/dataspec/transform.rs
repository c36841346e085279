//! Transforms and their serialized calls.

use super::DataSpec;
use crate::dp::DpParameters;
use crate::error::{DataSpecError, DataSpecResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An argument as written at the call site, before evaluation.
///
/// Literals are self-describing JSON values (scalars, sequences and
/// mappings); dataspec references become parents of the resulting node.
#[derive(Clone)]
pub enum Arg {
    Literal(JsonValue),
    DataSpec(Arc<DataSpec>),
}

impl Arg {
    pub fn as_dataspec(&self) -> Option<&Arc<DataSpec>> {
        match self {
            Arg::DataSpec(ds) => Some(ds),
            Arg::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&JsonValue> {
        match self {
            Arg::Literal(value) => Some(value),
            Arg::DataSpec(_) => None,
        }
    }

    pub fn is_dataspec(&self) -> bool {
        matches!(self, Arg::DataSpec(_))
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Literal(value) => write!(f, "Literal({})", value),
            Arg::DataSpec(ds) => write!(f, "DataSpec({})", ds.uuid()),
        }
    }
}

impl From<JsonValue> for Arg {
    fn from(value: JsonValue) -> Self {
        Arg::Literal(value)
    }
}

impl From<Arc<DataSpec>> for Arg {
    fn from(ds: Arc<DataSpec>) -> Self {
        Arg::DataSpec(ds)
    }
}

impl From<&Arc<DataSpec>> for Arg {
    fn from(ds: &Arc<DataSpec>) -> Self {
        Arg::DataSpec(Arc::clone(ds))
    }
}

/// The literal part of a call plus where its dataspec arguments went.
///
/// Positional literals are keyed by their original position; the positions
/// originally occupied by parent dataspecs are listed in
/// `dataspec_positions`, in parent order. Together they reconstruct the
/// exact call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerializedCall {
    pub literal_args: BTreeMap<usize, JsonValue>,
    pub literal_kwargs: BTreeMap<String, JsonValue>,
    pub dataspec_positions: Vec<usize>,
    pub dataspec_kwargs: Vec<String>,
}

impl SerializedCall {
    /// Number of positional arguments of the original call.
    pub fn arity(&self) -> usize {
        self.literal_args.len() + self.dataspec_positions.len()
    }
}

/// An external operator call: the operator id and its serialized arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// `"<library>.<op_name>"`
    pub id: String,
    pub call: SerializedCall,
    /// Budget and seed, present only on DP transforms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<DpParameters>,
}

impl Transform {
    pub fn new(id: impl Into<String>, call: SerializedCall) -> Self {
        Self {
            id: id.into(),
            call,
            dp: None,
        }
    }

    pub fn with_dp_parameters(mut self, parameters: DpParameters) -> Self {
        self.dp = Some(parameters);
        self
    }

    /// Splits the id into `(library, op_name)`.
    pub fn parse_id(id: &str) -> DataSpecResult<(&str, &str)> {
        match id.split_once('.') {
            Some((library, op_name)) if !library.is_empty() && !op_name.is_empty() => {
                Ok((library, op_name))
            }
            _ => Err(DataSpecError::InvalidTransformId(id.to_string())),
        }
    }

    /// Canonical bytes of the transform, used for token derivation.
    /// Canonical JSON bytes: object keys are sorted at every depth, so
    /// literals equal as values serialize identically.
    pub fn to_bytes(&self) -> DataSpecResult<Vec<u8>> {
        let value = canonical(serde_json::to_value(self)?);
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> DataSpecResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn canonical(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonical(value)))
                    .collect(),
            )
        }
        JsonValue::Array(values) => JsonValue::Array(values.into_iter().map(canonical).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call() -> SerializedCall {
        SerializedCall {
            literal_args: BTreeMap::from([(1, json!("age"))]),
            literal_kwargs: BTreeMap::new(),
            dataspec_positions: vec![0],
            dataspec_kwargs: vec![],
        }
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(Transform::parse_id("pandas.pd_getitem").unwrap(), ("pandas", "pd_getitem"));
        assert!(Transform::parse_id("pd_getitem").is_err());
        assert!(Transform::parse_id(".pd_getitem").is_err());
    }

    #[test]
    fn test_bytes_are_deterministic() {
        let a = Transform::new("pandas.pd_getitem", call());
        let b = Transform::new("pandas.pd_getitem", call());
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert_eq!(Transform::from_bytes(&a.to_bytes().unwrap()).unwrap(), a);
    }

    #[test]
    fn test_bytes_ignore_literal_key_order() {
        let with_literal = |literal: JsonValue| {
            let call = SerializedCall {
                literal_args: BTreeMap::from([(1, literal)]),
                dataspec_positions: vec![0],
                ..SerializedCall::default()
            };
            Transform::new("pandas.pd_merge", call).to_bytes().unwrap()
        };
        assert_eq!(
            with_literal(json!({"on": "id", "how": "inner"})),
            with_literal(json!({"how": "inner", "on": "id"}))
        );
    }

    #[test]
    fn test_dp_parameters_change_bytes() {
        let plain = Transform::new("pandas.pd_shape_dp", call());
        let dp = plain.clone().with_dp_parameters(DpParameters::new(1.0, 0.0));
        assert_ne!(plain.to_bytes().unwrap(), dp.to_bytes().unwrap());
    }
}
