//! Merge/extract of the protection side table into/out of a columnar table.
//!
//! The canonical protected table has exactly four columns: [`PUBLIC`],
//! [`USER_COLUMN`], [`WEIGHTS`] and [`DATA`], the latter a struct column
//! holding the data row. That exact name set is the only thing that marks a
//! table as protected.

use super::ProtectionTable;
use crate::constants::{DATA, PUBLIC, USER_COLUMN, WEIGHTS};
use crate::error::{DataSpecError, DataSpecResult};
use crate::tabular::{Column, DataType, Field, Table, Tabular};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

pub struct ProtectionCodec;

impl ProtectionCodec {
    /// Whether a column-name set is exactly the protected format.
    pub fn is_protected_format(table: &Table) -> bool {
        let expected: BTreeSet<&str> = [PUBLIC, USER_COLUMN, WEIGHTS, DATA].into_iter().collect();
        table.column_name_set() == expected
    }

    /// Appends the data as a struct column onto the protection columns.
    ///
    /// Without protection the data is returned as a plain frame. A series is
    /// stored as its one-column frame, so [`extract`](Self::extract) gives
    /// it back as that frame; frames round-trip unchanged.
    pub fn merge(data: &Tabular, protection: Option<&ProtectionTable>) -> DataSpecResult<Table> {
        let frame = data.to_frame()?;
        let Some(pe) = protection else {
            return Ok(frame);
        };
        if pe.index() != frame.index() {
            return Err(DataSpecError::tabular(format!(
                "protection rows ({}) are not aligned with data rows ({})",
                pe.num_rows(),
                frame.num_rows()
            )));
        }

        let fields: Vec<Field> = frame.columns().iter().map(Column::field).collect();
        let data_values = (0..frame.num_rows()).map(|row| frame.row_object(row)).collect();

        Table::with_index(
            frame.index().to_vec(),
            vec![
                Column::with_type(
                    PUBLIC,
                    DataType::Boolean,
                    pe.public().iter().map(|&p| JsonValue::Bool(p)).collect(),
                ),
                Column::with_type(
                    USER_COLUMN,
                    DataType::Utf8,
                    pe.user_id()
                        .iter()
                        .map(|u| u.clone().map(JsonValue::String).unwrap_or(JsonValue::Null))
                        .collect(),
                ),
                Column::with_type(
                    WEIGHTS,
                    DataType::Float64,
                    pe.weights().iter().map(|&w| JsonValue::from(w)).collect(),
                ),
                Column::with_type(DATA, DataType::Struct(fields), data_values),
            ],
        )
    }

    /// Splits a protected table into its data and protection.
    ///
    /// Any table whose columns are not exactly the protected format comes
    /// back unchanged with no protection.
    pub fn extract(table: &Table) -> DataSpecResult<(Tabular, Option<ProtectionTable>)> {
        if !Self::is_protected_format(table) {
            return Ok((Tabular::Frame(table.clone()), None));
        }
        // Presence of all four columns is guaranteed by the format check.
        let column = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| DataSpecError::tabular(format!("missing column '{}'", name)))
        };

        let data_column = column(DATA)?;
        let DataType::Struct(fields) = &data_column.data_type else {
            return Err(DataSpecError::tabular(format!(
                "column '{}' must be a struct, found {:?}",
                DATA, data_column.data_type
            )));
        };
        let columns = fields
            .iter()
            .map(|field| {
                let values = data_column
                    .values
                    .iter()
                    .map(|row| row.get(&field.name).cloned().unwrap_or(JsonValue::Null))
                    .collect();
                Column::with_type(field.name.clone(), field.data_type.clone(), values)
            })
            .collect();
        let data = Table::with_index(table.index().to_vec(), columns)?;

        let public = column(PUBLIC)?
            .values
            .iter()
            .map(|v| {
                v.as_bool()
                    .ok_or_else(|| DataSpecError::tabular(format!("non-boolean {} value {}", PUBLIC, v)))
            })
            .collect::<DataSpecResult<Vec<_>>>()?;
        let user_id = column(USER_COLUMN)?
            .values
            .iter()
            .map(|v| match v {
                JsonValue::Null => None,
                JsonValue::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        let weights = column(WEIGHTS)?
            .values
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| DataSpecError::tabular(format!("non-numeric {} value {}", WEIGHTS, v)))
            })
            .collect::<DataSpecResult<Vec<_>>>()?;

        let protection = ProtectionTable::new(table.index().to_vec(), public, user_id, weights)?;
        Ok((Tabular::Frame(data), Some(protection)))
    }
}
