//! Data models for the fixture engine.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{DatabaseType, PopulationState, mask_connection_string};
pub use query::{Criteria, Row, RowSet, Value};
pub use schema::{ColumnTypes, PrimaryKey, TableInfo, TableType};
