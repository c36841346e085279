//! Leaf dataspecs backed by in-memory values.
//!
//! Reading sources from storage is someone else's job; whoever loads them
//! hands the value over here, optionally already in the protected format.

use crate::error::{DataSpecError, DataSpecResult};
use crate::protection::{Protected, ProtectionCodec, ProtectionTable};
use crate::tabular::{Column, DataType, Table, Tabular};
use serde_json::Value as JsonValue;

/// Value held by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Dataset(Protected<Tabular>),
    Scalar(JsonValue),
}

/// A leaf of the dataspec graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub(crate) data: SourceData,
    pub(crate) public: bool,
    pub(crate) synthetic: Option<SourceData>,
}

impl Source {
    /// A dataset source; a table in the protected format is split into its
    /// data and protection.
    pub fn dataset(table: Table) -> DataSpecResult<Self> {
        let (data, protection) = ProtectionCodec::extract(&table)?;
        let public = protection.is_none();
        Ok(Self {
            data: SourceData::Dataset(Protected::new(data, protection)),
            public,
            synthetic: None,
        })
    }

    /// A protected dataset source. The protection must carry exactly the
    /// data's row labels, in the same order.
    pub fn protected(data: impl Into<Tabular>, protection: ProtectionTable) -> DataSpecResult<Self> {
        let data = data.into();
        if protection.index() != data.index() {
            return Err(DataSpecError::tabular(format!(
                "protection rows {:?} are not aligned with data rows {:?}",
                protection.index(),
                data.index()
            )));
        }
        Ok(Self {
            data: SourceData::Dataset(Protected::new(data, Some(protection))),
            public: false,
            synthetic: None,
        })
    }

    /// A public dataset source.
    pub fn public(data: impl Into<Tabular>) -> Self {
        Self {
            data: SourceData::Dataset(Protected::unprotected(data.into())),
            public: true,
            synthetic: None,
        }
    }

    pub fn scalar(value: JsonValue, public: bool) -> Self {
        Self {
            data: SourceData::Scalar(value),
            public,
            synthetic: None,
        }
    }

    /// Attaches a safe-to-inspect stand-in for the real value.
    pub fn with_synthetic(mut self, synthetic: impl Into<Tabular>) -> Self {
        self.synthetic = Some(SourceData::Dataset(Protected::unprotected(synthetic.into())));
        self
    }

    pub fn with_synthetic_scalar(mut self, synthetic: JsonValue) -> Self {
        self.synthetic = Some(SourceData::Scalar(synthetic));
        self
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_protected(&self) -> bool {
        matches!(&self.data, SourceData::Dataset(d) if d.is_protected()) && !self.public
    }

    pub fn data(&self) -> &SourceData {
        &self.data
    }

    /// The synthetic stand-in for this source.
    ///
    /// Public sources stand in for themselves. Without an explicit stand-in,
    /// a private dataset is replaced by one row of type defaults and a
    /// private scalar by `null`.
    pub fn synthetic_data(&self) -> DataSpecResult<SourceData> {
        if let Some(synthetic) = &self.synthetic {
            return Ok(synthetic.clone());
        }
        if self.public {
            return Ok(self.data.clone());
        }
        match &self.data {
            SourceData::Scalar(_) => Ok(SourceData::Scalar(JsonValue::Null)),
            SourceData::Dataset(protected) => {
                let frame = protected.data.to_frame()?;
                let columns = frame
                    .columns()
                    .iter()
                    .map(|c| {
                        Column::with_type(
                            c.name.clone(),
                            c.data_type.clone(),
                            vec![placeholder(&c.data_type)],
                        )
                    })
                    .collect();
                let table = Table::new(columns)?;
                Ok(SourceData::Dataset(Protected::unprotected(Tabular::Frame(table))))
            }
        }
    }
}

fn placeholder(data_type: &DataType) -> JsonValue {
    match data_type {
        DataType::Boolean => JsonValue::Bool(false),
        DataType::Int64 => JsonValue::from(0),
        DataType::Float64 => JsonValue::from(0.0),
        DataType::Utf8 => JsonValue::String(String::new()),
        DataType::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|f| (f.name.clone(), placeholder(&f.data_type)))
                .collect(),
        ),
        DataType::Null | DataType::Json => JsonValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> Table {
        Table::from_records(&json!([{"age": 31, "city": "Paris"}, {"age": 45, "city": "Lyon"}])).unwrap()
    }

    #[test]
    fn test_protected_format_table_becomes_protected_source() {
        let pe = ProtectionTable::for_users(["u1", "u2"]);
        let merged = ProtectionCodec::merge(&Tabular::Frame(table()), Some(&pe)).unwrap();
        let source = Source::dataset(merged).unwrap();
        assert!(source.is_protected());
        assert!(!source.is_public());

        let plain = Source::dataset(table()).unwrap();
        assert!(plain.is_public());
    }

    #[test]
    fn test_protected_source_requires_aligned_protection() {
        let short = Source::protected(table(), ProtectionTable::for_users(["u1"]));
        assert!(matches!(short, Err(DataSpecError::Tabular(_))));

        let relabelled = ProtectionTable::for_users(["u1", "u2"]).with_index(vec![5, 6]).unwrap();
        assert!(Source::protected(table(), relabelled).is_err());
    }

    #[test]
    fn test_default_synthetic_keeps_schema() {
        let source = Source::protected(table(), ProtectionTable::for_users(["u1", "u2"])).unwrap();
        let SourceData::Dataset(synthetic) = source.synthetic_data().unwrap() else {
            panic!("Expected dataset");
        };
        let frame = synthetic.data.to_frame().unwrap();
        assert_eq!(frame.num_rows(), 1);
        assert_eq!(frame.schema(), table().schema());
        assert!(!synthetic.is_protected());
    }
}
