//! Fixture lifecycle: dataset population, tracked insertions and the
//! orchestrating module tests interact with.

pub mod dump;
pub mod module;
pub mod populator;
pub mod tracker;

pub use module::{DbModule, TestCase};
pub use populator::{PopulateFn, Populator};
pub use tracker::{CleanupFailure, CleanupReport, FixtureTracker, InsertedRow, RowIdentity};
