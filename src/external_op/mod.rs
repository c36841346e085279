//! # External operators
//!
//! Resolution, privacy analysis and evaluation of operators applied to
//! dataspecs:
//!
//! * [`registry`] resolves `"<library>.<op_name>"` ids to typed
//!   [`OpImplementation`]s.
//! * [`arguments`] splits calls into literals and parents and back.
//! * [`protection_utils`] decides PEP tokens and DP applicability.
//! * [`evaluation`] and [`executor`] compute values.

pub mod arguments;
pub mod evaluation;
pub mod executor;
pub mod implementation;
pub mod protection_utils;
pub mod registry;

pub use evaluation::{ArgumentEvaluator, EvaluatedArguments};
pub use executor::{Evaluation, Executor};
pub use implementation::{
    BoundArguments, DataFunction, DpDataFunction, DpOp, OpImplementation, Param, PepOp, PlainOp,
    Signature, SyncDpFunction, SyncFunction, Value,
};
pub use registry::{OpRegistry, Symbol, SymbolTable};
