//! Columnar frames.

use super::types::{DataType, Field, TableSchema};
use crate::error::{DataSpecError, DataSpecResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A single named column of JSON cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<JsonValue>,
}

impl Column {
    /// Creates a column, inferring its type from the values.
    pub fn new(name: impl Into<String>, values: Vec<JsonValue>) -> Self {
        let data_type = DataType::infer(&values);
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    pub fn with_type(name: impl Into<String>, data_type: DataType, values: Vec<JsonValue>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.data_type.clone())
    }

    fn take(&self, positions: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            values: positions.iter().map(|&p| self.values[p].clone()).collect(),
        }
    }
}

/// A frame: ordered columns sharing one row index.
///
/// The index holds row labels, not positions. Operators that drop or
/// reorder rows keep the labels of the surviving rows, which is what lets
/// side tables be realigned with a result after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index: Vec<usize>,
    columns: Vec<Column>,
}

impl Table {
    /// Creates a table with a default `0..n` index.
    pub fn new(columns: Vec<Column>) -> DataSpecResult<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        Self::with_index((0..rows).collect(), columns)
    }

    /// Creates a table over the given row labels, which must be distinct.
    pub fn with_index(index: Vec<usize>, columns: Vec<Column>) -> DataSpecResult<Self> {
        check_unique_labels(&index)?;
        let mut seen = BTreeSet::new();
        for column in &columns {
            if column.len() != index.len() {
                return Err(DataSpecError::tabular(format!(
                    "column '{}' has {} rows, index has {}",
                    column.name,
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(DataSpecError::tabular(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { index, columns })
    }

    pub fn empty() -> Self {
        Self {
            index: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Builds a table from a JSON array of objects.
    ///
    /// Column order follows first appearance; missing keys become nulls.
    /// Returns `None` when the value is not an array of objects.
    pub fn from_records(records: &JsonValue) -> Option<Self> {
        let rows = records.as_array()?;
        let mut names: Vec<String> = Vec::new();
        for row in rows {
            for key in row.as_object()?.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        let columns = names
            .iter()
            .map(|name| {
                let values = rows
                    .iter()
                    .map(|row| row.get(name).cloned().unwrap_or(JsonValue::Null))
                    .collect();
                Column::new(name.clone(), values)
            })
            .collect();
        Self::new(columns).ok()
    }

    /// Rows as JSON objects, in column order.
    pub fn to_records(&self) -> Vec<JsonValue> {
        (0..self.num_rows()).map(|row| self.row_object(row)).collect()
    }

    pub(crate) fn row_object(&self, row: usize) -> JsonValue {
        let mut object = Map::new();
        for column in &self.columns {
            object.insert(column.name.clone(), column.values[row].clone());
        }
        JsonValue::Object(object)
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_name_set(&self) -> BTreeSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.columns.iter().map(Column::field).collect())
    }

    /// Keeps the named columns, in the requested order.
    pub fn select(&self, names: &[String]) -> DataSpecResult<Self> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| DataSpecError::tabular(format!("no column named '{}'", name)))
            })
            .collect::<DataSpecResult<Vec<_>>>()?;
        Ok(Self {
            index: self.index.clone(),
            columns,
        })
    }

    /// Keeps rows at the given positions, carrying their labels along.
    /// A row can be taken at most once.
    pub fn take(&self, positions: &[usize]) -> DataSpecResult<Self> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.num_rows()) {
            return Err(DataSpecError::tabular(format!(
                "row position {} out of bounds for {} rows",
                bad,
                self.num_rows()
            )));
        }
        let index: Vec<usize> = positions.iter().map(|&p| self.index[p]).collect();
        check_unique_labels(&index)?;
        Ok(Self {
            index,
            columns: self.columns.iter().map(|c| c.take(positions)).collect(),
        })
    }

    pub fn head(&self, n: usize) -> Self {
        let positions: Vec<usize> = (0..n.min(self.num_rows())).collect();
        Self {
            index: positions.iter().map(|&p| self.index[p]).collect(),
            columns: self.columns.iter().map(|c| c.take(&positions)).collect(),
        }
    }

    /// Keeps rows whose mask entry is `true`.
    pub fn filter(&self, mask: &[bool]) -> DataSpecResult<Self> {
        if mask.len() != self.num_rows() {
            return Err(DataSpecError::tabular(format!(
                "mask has {} entries for {} rows",
                mask.len(),
                self.num_rows()
            )));
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(pos, keep)| keep.then_some(pos))
            .collect();
        self.take(&positions)
    }

    /// Selects rows by index label, in the order given.
    pub fn loc(&self, labels: &[usize]) -> DataSpecResult<Self> {
        let positions = label_positions(&self.index, labels)?;
        self.take(&positions)
    }
}

/// Fails on the first row label that appears twice.
pub(crate) fn check_unique_labels(index: &[usize]) -> DataSpecResult<()> {
    let mut seen = HashSet::with_capacity(index.len());
    match index.iter().find(|&&label| !seen.insert(label)) {
        Some(label) => Err(DataSpecError::tabular(format!("duplicate row label {}", label))),
        None => Ok(()),
    }
}

/// Maps row labels to positions within `index`.
pub(crate) fn label_positions(index: &[usize], labels: &[usize]) -> DataSpecResult<Vec<usize>> {
    let lookup: HashMap<usize, usize> = index
        .iter()
        .enumerate()
        .map(|(pos, &label)| (label, pos))
        .collect();
    labels
        .iter()
        .map(|label| {
            lookup
                .get(label)
                .copied()
                .ok_or_else(|| DataSpecError::tabular(format!("row label {} not in index", label)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Table {
        Table::from_records(&json!([
            {"name": "ada", "age": 36},
            {"name": "bob", "age": 41},
            {"name": "cyd", "age": 29},
        ]))
        .unwrap()
    }

    #[test]
    fn test_from_records_keeps_column_order() {
        let table = people();
        assert_eq!(table.column_names(), vec!["name", "age"]);
        assert_eq!(table.index(), &[0, 1, 2]);
        assert_eq!(table.column("age").unwrap().data_type, DataType::Int64);
    }

    #[test]
    fn test_records_keep_first_appearance_order() {
        let table = Table::from_records(&json!([{"zeta": 1, "alpha": 2}, {"mid": 3}])).unwrap();
        assert_eq!(table.column_names(), vec!["zeta", "alpha", "mid"]);

        let keys: Vec<String> = table.to_records()[0]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_row_labels_rejected() {
        let result = Table::with_index(vec![0, 0], vec![Column::new("a", vec![json!(1), json!(2)])]);
        assert!(result.is_err());
        assert!(people().loc(&[1, 1]).is_err());
    }

    #[test]
    fn test_from_records_rejects_non_records() {
        assert!(Table::from_records(&json!(3)).is_none());
        assert!(Table::from_records(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_filter_keeps_labels() {
        let table = people().filter(&[true, false, true]).unwrap();
        assert_eq!(table.index(), &[0, 2]);
        assert_eq!(table.column("name").unwrap().values, vec![json!("ada"), json!("cyd")]);
    }

    #[test]
    fn test_loc_by_label() {
        let table = people().filter(&[false, true, true]).unwrap();
        let picked = table.loc(&[2, 1]).unwrap();
        assert_eq!(picked.index(), &[2, 1]);
        assert!(table.loc(&[0]).is_err());
    }

    #[test]
    fn test_select_missing_column() {
        assert!(people().select(&["salary".to_string()]).is_err());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let result = Table::new(vec![
            Column::new("a", vec![json!(1)]),
            Column::new("b", vec![json!(1), json!(2)]),
        ]);
        assert!(result.is_err());
    }
}
