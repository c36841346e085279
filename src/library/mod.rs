//! Built-in operator libraries.

pub mod pandas;

use crate::external_op::SymbolTable;

/// Symbols of every built-in library.
pub fn builtin_symbols() -> SymbolTable {
    pandas::symbols()
}
