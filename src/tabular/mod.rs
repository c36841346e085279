//! # Tabular values
//!
//! Lightweight columnar values exchanged between operators: a [`Table`]
//! (frame) or a [`Series`], unified by the [`Tabular`] sum type. Cells are
//! JSON values with a declared [`DataType`] per column.

pub mod series;
pub mod table;
pub mod types;

pub use series::{Series, Tabular, TabularVariant};
pub use table::{Column, Table};
pub use types::{DataType, Field, TableSchema};
