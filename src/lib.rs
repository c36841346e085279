//! # Dataspec Library
//!
//! This library implements an external-operator execution engine for
//! privacy-aware transform graphs. Computations are described as a DAG of
//! immutable dataspecs; each external node applies a registered operator to
//! its parents.
//!
//! ## Core Components
//!
//! * `dataspec` - DAG nodes, transforms and sources
//! * `external_op` - Operator registry, PEP/DP analysis and the executor
//! * `protection` - Protected-entity side tables and the protected table codec
//! * `dp` - Budget and privacy-query contract of DP operators
//! * `tabular` - Frames, series and schemas exchanged between operators
//! * `library` - Built-in operator libraries
//! * `config`, `logging`, `error` - Ambient configuration and error handling
//!
//! ## Architecture
//!
//! Operators are routed once from an explicit [`RoutingConfig`] into an
//! [`OpRegistry`]. Whether a node preserves row alignment with protected
//! users (PEP) and whether a DP-equivalent operator may replace it are pure
//! functions of the graph. Values are computed on demand by an
//! [`Executor`], which carries protection alongside data and records what
//! DP operators spent on the dataspec that ran them.

pub mod config;
pub mod constants;
pub mod dataspec;
pub mod dp;
pub mod error;
pub mod external_op;
pub mod library;
pub mod logging;
pub mod protection;
pub mod tabular;

// Re-export main types for convenience
pub use config::{EngineConfig, ExecutionConfig, RoutingConfig};
pub use dataspec::{Arg, DataSpec, DataSpecKind, PepToken, PublicContext, Source, Transform};
pub use dp::{DpParameters, PrivacyLimit, PrivateQuery};
pub use error::{DataSpecError, DataSpecResult};
pub use external_op::{Executor, OpImplementation, OpRegistry};
pub use logging::{init_logging, LogConfig};
pub use protection::{Protected, ProtectionCodec, ProtectionTable};
pub use tabular::{Table, Tabular};
