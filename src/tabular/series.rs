//! One-dimensional tabular values and the [`Tabular`] sum type.

use super::table::{check_unique_labels, Column, Table};
use super::types::{DataType, TableSchema};
use crate::error::{DataSpecError, DataSpecResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single labelled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub index: Vec<usize>,
    pub data_type: DataType,
    pub values: Vec<JsonValue>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<JsonValue>) -> Self {
        let data_type = DataType::infer(&values);
        Self {
            name: name.into(),
            index: (0..values.len()).collect(),
            data_type,
            values,
        }
    }

    /// A series over distinct row labels, one per value.
    pub fn with_index(
        name: impl Into<String>,
        index: Vec<usize>,
        values: Vec<JsonValue>,
    ) -> DataSpecResult<Self> {
        let data_type = DataType::infer(&values);
        Self::from_column(index, Column::with_type(name, data_type, values))
    }

    pub fn from_column(index: Vec<usize>, column: Column) -> DataSpecResult<Self> {
        if index.len() != column.len() {
            return Err(DataSpecError::tabular(format!(
                "series '{}' has {} values, index has {}",
                column.name,
                column.len(),
                index.len()
            )));
        }
        check_unique_labels(&index)?;
        Ok(Self {
            name: column.name,
            index,
            data_type: column.data_type,
            values: column.values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_frame(&self) -> DataSpecResult<Table> {
        Table::with_index(
            self.index.clone(),
            vec![Column::with_type(
                self.name.clone(),
                self.data_type.clone(),
                self.values.clone(),
            )],
        )
    }
}

/// Which shapes of tabular value an operator parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabularVariant {
    Series,
    Frame,
}

/// A tabular value: either a series or a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "value", rename_all = "snake_case")]
pub enum Tabular {
    Series(Series),
    Frame(Table),
}

impl Tabular {
    pub fn variant(&self) -> TabularVariant {
        match self {
            Tabular::Series(_) => TabularVariant::Series,
            Tabular::Frame(_) => TabularVariant::Frame,
        }
    }

    /// Row labels, the authoritative record of filtering and reordering.
    pub fn index(&self) -> &[usize] {
        match self {
            Tabular::Series(series) => &series.index,
            Tabular::Frame(table) => table.index(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.index().len()
    }

    pub fn head(&self, n: usize) -> Self {
        match self {
            Tabular::Frame(table) => Tabular::Frame(table.head(n)),
            Tabular::Series(series) => {
                let keep = n.min(series.len()).min(series.index.len());
                Tabular::Series(Series {
                    name: series.name.clone(),
                    index: series.index[..keep].to_vec(),
                    data_type: series.data_type.clone(),
                    values: series.values[..keep].to_vec(),
                })
            }
        }
    }

    pub fn schema(&self) -> DataSpecResult<TableSchema> {
        Ok(self.to_frame()?.schema())
    }

    pub fn to_frame(&self) -> DataSpecResult<Table> {
        match self {
            Tabular::Frame(table) => Ok(table.clone()),
            Tabular::Series(series) => series.to_frame(),
        }
    }

    pub fn as_frame(&self) -> Option<&Table> {
        match self {
            Tabular::Frame(table) => Some(table),
            Tabular::Series(_) => None,
        }
    }

    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Tabular::Series(series) => Some(series),
            Tabular::Frame(_) => None,
        }
    }
}

impl From<Table> for Tabular {
    fn from(table: Table) -> Self {
        Tabular::Frame(table)
    }
}

impl From<Series> for Tabular {
    fn from(series: Series) -> Self {
        Tabular::Series(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_series_head_keeps_labels() {
        let series = Series::with_index("x", vec![4, 7, 9], vec![json!(1), json!(2), json!(3)]).unwrap();
        let head = Tabular::from(series).head(2);
        assert_eq!(head.index(), &[4, 7]);
        assert_eq!(head.variant(), TabularVariant::Series);
    }

    #[test]
    fn test_series_index_must_match_values() {
        assert!(Series::with_index("x", vec![0], vec![json!(1), json!(2)]).is_err());
        assert!(Series::with_index("x", vec![3, 3], vec![json!(1), json!(2)]).is_err());
    }

    #[test]
    fn test_series_to_frame() {
        let series = Series::new("x", vec![json!(1.5), json!(2.0)]);
        let frame = series.to_frame().unwrap();
        assert_eq!(frame.column_names(), vec!["x"]);
        assert_eq!(frame.column("x").unwrap().data_type, DataType::Float64);
    }
}
