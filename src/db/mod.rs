//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection management (one session per suite or per test)
//! - Query execution and parameter binding
//! - Criteria-based SQL generation
//! - Schema introspection and cleanup
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

pub mod driver;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod query_builder;
pub mod schema;
pub mod types;

pub use driver::Driver;
pub use executor::QueryExecutor;
pub use pool::{Connection, ConnectionManager, DbPool};
pub use query_builder::{DeleteScope, QueryBuilder, SqlFragment};
pub use schema::SchemaInspector;
