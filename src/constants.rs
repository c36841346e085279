/// Common constants used across the dataspec engine.
///
/// Column names of the canonical protected table. This exact set of four
/// names is the only signal used to recognize a protected table.
pub const PUBLIC: &str = "pe_is_public";
pub const USER_COLUMN: &str = "pe_user_id";
pub const WEIGHTS: &str = "pe_weights";
pub const DATA: &str = "pe_data";

/// Named property carrying the serialized sub-queries of a DP computation.
pub const PRIVATE_QUERY: &str = "private_query";

/// Library name of the built-in tabular operators.
pub const PANDAS_LIBRARY: &str = "pandas";

/// Default number of synthetic rows evaluated to infer a dataset schema.
pub const DEFAULT_SCHEMA_SAMPLE_ROWS: usize = 1;

/// Seed used by DP transforms that do not carry their own.
pub const DEFAULT_DP_SEED: u64 = 1234;
