//! Database fixture and assertion engine for integration tests.
//!
//! The engine connects to SQLite, PostgreSQL or MySQL, loads a known dataset,
//! lets tests insert rows that are removed again afterwards, and offers
//! assertions over the data:
//!
//! ```no_run
//! use db_fixture::{Config, DbModule, TestCase, criteria};
//!
//! # async fn run() -> db_fixture::DbResult<()> {
//! let config = Config::new("sqlite:target/suite.db")
//!     .with_populate(true)
//!     .with_cleanup(true)
//!     .with_dump("tests/_data/dump.sql");
//! let mut db = DbModule::new(config)?;
//!
//! db.before_suite().await?;
//! let test = TestCase::passed("creates a user");
//! db.before(&test).await?;
//!
//! db.have_in_database("users", &criteria! { "name" => "john", "email" => "john@jon.com" })
//!     .await?;
//! db.see_in_database("users", &criteria! { "name" => "john" }).await?;
//!
//! db.after(&test).await?;
//! db.after_suite().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod models;

pub use config::{Config, ConfigOverrides};
pub use db::{Connection, ConnectionManager, DeleteScope, Driver, QueryBuilder};
pub use error::{DbError, DbResult, QueryErrorKind};
pub use fixture::{CleanupReport, DbModule, Populator, TestCase};
pub use models::{Criteria, DatabaseType, PopulationState, PrimaryKey, Row, RowSet, Value};
