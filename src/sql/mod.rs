//! SQL generation: column types, DDL, and parameterized data queries.

mod builder;
pub mod ddl;
pub mod params;
pub mod types;
pub use builder::*;
pub use params::*;
pub use types::{column_definition, map_type, ColumnType, TypeOverrides};
