//! Column types and schemas for tabular values.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Logical type of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields", rename_all = "snake_case")]
pub enum DataType {
    /// Column with no non-null value to infer from
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Nested record, one JSON object per row
    Struct(Vec<Field>),
    /// Arrays or anything else that has no columnar counterpart
    Json,
}

impl DataType {
    /// Infers a column type from its cells.
    ///
    /// Integers widen to floats when both appear and struct fields are
    /// merged across rows; any other mix of kinds falls back to
    /// [`DataType::Json`].
    pub fn infer(values: &[JsonValue]) -> Self {
        values
            .iter()
            .map(Self::of_value)
            .fold(DataType::Null, DataType::unify)
    }

    /// The narrowest type holding values of both types.
    pub fn unify(self, other: DataType) -> DataType {
        match (self, other) {
            (current, DataType::Null) => current,
            (DataType::Null, other) => other,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            (DataType::Struct(fields), DataType::Struct(more)) => {
                DataType::Struct(merge_fields(fields, more))
            }
            (current, other) if current == other => current,
            _ => DataType::Json,
        }
    }

    fn of_value(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => DataType::Null,
            JsonValue::Bool(_) => DataType::Boolean,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
            JsonValue::Number(_) => DataType::Float64,
            JsonValue::String(_) => DataType::Utf8,
            JsonValue::Object(map) => DataType::Struct(
                map.iter()
                    .map(|(name, v)| Field::new(name.clone(), Self::of_value(v)))
                    .collect(),
            ),
            JsonValue::Array(_) => DataType::Json,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }
}

/// Union of two field lists: fields keep first-appearance order and a field
/// present in both gets the unified type.
fn merge_fields(mut fields: Vec<Field>, more: Vec<Field>) -> Vec<Field> {
    for field in more {
        match fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => {
                let current = std::mem::replace(&mut existing.data_type, DataType::Null);
                existing.data_type = current.unify(field.data_type);
            }
            None => fields.push(field),
        }
    }
    fields
}

/// A named, typed column slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Schema of a dataset.
///
/// `protected` is the protected-format marker: rows of a dataset carrying it
/// are attributable to protected entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableSchema {
    pub fields: Vec<Field>,
    #[serde(default)]
    pub protected: bool,
}

impl TableSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            protected: false,
        }
    }

    /// Returns the same schema with the protected-format marker set.
    pub fn into_protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_widens_integers() {
        assert_eq!(DataType::infer(&[json!(1), json!(2)]), DataType::Int64);
        assert_eq!(DataType::infer(&[json!(1), json!(2.5)]), DataType::Float64);
        assert_eq!(DataType::infer(&[json!(null), json!("a")]), DataType::Utf8);
        assert_eq!(DataType::infer(&[]), DataType::Null);
    }

    #[test]
    fn test_infer_mixed_kinds_is_json() {
        assert_eq!(DataType::infer(&[json!(1), json!("a")]), DataType::Json);
    }

    #[test]
    fn test_infer_struct_takes_union_of_fields() {
        let inferred = DataType::infer(&[
            json!({"a": 1, "c": null}),
            json!({"a": 2.5, "b": "x", "c": true}),
        ]);
        assert_eq!(
            inferred,
            DataType::Struct(vec![
                Field::new("a", DataType::Float64),
                Field::new("c", DataType::Boolean),
                Field::new("b", DataType::Utf8),
            ])
        );
    }

    #[test]
    fn test_schema_protected_marker() {
        let schema = TableSchema::new(vec![Field::new("age", DataType::Int64)]);
        assert!(!schema.protected);
        let schema = schema.into_protected();
        assert!(schema.protected);
        assert_eq!(schema.field_names(), vec!["age"]);
    }
}
