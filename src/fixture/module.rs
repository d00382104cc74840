//! Test lifecycle orchestration and the assertion API.
//!
//! [`DbModule`] is what a test runner drives: suite and test hooks manage the
//! connection, the dataset and tracked rows, while the `*_in_database`
//! methods are the assertions and helpers a test calls.

use crate::config::{Config, ConfigOverrides};
use crate::db::{Connection, ConnectionManager, Driver};
use crate::error::{DbError, DbResult};
use crate::fixture::populator;
use crate::fixture::tracker::{CleanupReport, FixtureTracker};
use crate::models::{Criteria, PopulationState, Row};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The test a hook is running for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub failed: bool,
}

impl TestCase {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failed: false,
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failed: true,
        }
    }
}

/// Fixture and assertion engine for one suite.
///
/// Every method takes `&mut self` or `&self` and is awaited to completion, so
/// hooks and assertions never interleave.
#[derive(Debug)]
pub struct DbModule {
    initial_config: Arc<Config>,
    config: Arc<Config>,
    connections: ConnectionManager,
    tracker: FixtureTracker,
    state: PopulationState,
    /// A test has finished since the dataset was last loaded.
    dirty: bool,
}

impl DbModule {
    /// Create an engine for the given configuration. Does not connect.
    pub fn new(config: Config) -> DbResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            initial_config: Arc::clone(&config),
            config,
            connections: ConnectionManager::new(),
            tracker: FixtureTracker::new(),
            state: PopulationState::default(),
            dirty: false,
        })
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn state(&self) -> PopulationState {
        self.state
    }

    pub fn is_populated(&self) -> bool {
        self.state.is_populated()
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    /// Rows inserted by the current test that will be removed in `after`.
    pub fn tracked(&self) -> &FixtureTracker {
        &self.tracker
    }

    /// The open connection.
    pub fn connection(&self) -> DbResult<Arc<Connection>> {
        self.require_connection("connection")
    }

    /// Driver of the open connection.
    pub fn driver(&self) -> DbResult<&Driver> {
        self.connections
            .current()
            .map(|c| c.driver())
            .ok_or_else(|| DbError::not_connected("driver"))
    }

    fn require_connection(&self, operation: &str) -> DbResult<Arc<Connection>> {
        self.connections
            .current()
            .cloned()
            .ok_or_else(|| DbError::not_connected(operation))
    }

    // =========================================================================
    // Lifecycle hooks
    // =========================================================================

    /// Connect and, when configured, load the dataset.
    pub async fn before_suite(&mut self) -> DbResult<()> {
        let config = self.config();
        self.connections.connect(&config).await?;

        if config.populate {
            if config.cleanup {
                self.cleanup().await?;
            }
            self.load_dump().await?;
        }
        info!(populated = self.is_populated(), "Suite initialized");
        Ok(())
    }

    /// Prepare the connection and dataset for a test.
    pub async fn before(&mut self, test: &TestCase) -> DbResult<()> {
        let config = self.config();
        self.connections.ensure_connected(&config, true).await?;

        if config.populate && config.cleanup && (self.dirty || !self.is_populated()) {
            debug!(test = %test.name, "Reloading dataset");
            self.cleanup().await?;
            self.load_dump().await?;
        }
        Ok(())
    }

    /// Remove rows tracked during the test.
    ///
    /// With `skip_cleanup_if_failed`, rows from a failed test are kept for
    /// inspection and only forgotten.
    pub async fn after(&mut self, test: &TestCase) -> DbResult<CleanupReport> {
        self.dirty = true;

        let report = if self.config.skip_cleanup_if_failed && test.failed {
            let kept = self.tracker.discard();
            if kept > 0 {
                warn!(test = %test.name, rows = kept, "Test failed, keeping inserted rows");
            }
            CleanupReport::default()
        } else if self.tracker.is_empty() {
            CleanupReport::default()
        } else {
            match self.connections.current() {
                Some(connection) => self.tracker.cleanup_all(connection.driver()).await,
                None => {
                    let lost = self.tracker.discard();
                    return Err(DbError::internal(format!(
                        "{lost} tracked rows could not be removed: connection closed during the test"
                    )));
                }
            }
        };

        if self.config.reconnect {
            self.connections.disconnect().await;
        }
        Ok(report)
    }

    /// Close the connection. Never fails.
    pub async fn after_suite(&mut self) {
        self.tracker.discard();
        self.connections.disconnect().await;
        info!("Suite finished");
    }

    // =========================================================================
    // Dataset management
    // =========================================================================

    /// Drop every object in the database.
    pub async fn cleanup(&mut self) -> DbResult<()> {
        let connection = self.require_connection("cleanup")?;
        connection.driver().cleanup().await?;
        // The schema is gone; tracked rows went with it.
        self.tracker.discard();
        self.state = PopulationState::Unpopulated;
        Ok(())
    }

    /// Load the dataset when `populate` is enabled.
    pub async fn load_dump(&mut self) -> DbResult<()> {
        if !self.config.populate {
            return Ok(());
        }
        let connection = self.require_connection("load_dump")?;
        populator::populate(&self.config, connection.driver()).await?;
        self.state = PopulationState::Populated;
        self.dirty = false;
        info!("Dataset loaded");
        Ok(())
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Apply overrides, producing a new configuration.
    ///
    /// A change of connection settings reconnects right away; rows tracked on
    /// the old connection are removed first.
    pub async fn reconfigure(&mut self, overrides: &ConfigOverrides) -> DbResult<Arc<Config>> {
        let next = self.config.merged(overrides);
        self.replace_config(next).await
    }

    /// Restore the configuration the engine was created with.
    pub async fn reset_config(&mut self) -> DbResult<Arc<Config>> {
        let initial = (*self.initial_config).clone();
        self.replace_config(initial).await
    }

    async fn replace_config(&mut self, next: Config) -> DbResult<Arc<Config>> {
        next.validate()?;

        let reconnect = self.connections.is_connected()
            && (next.dsn != self.config.dsn
                || next.user != self.config.user
                || next.password != self.config.password
                || next.initial_queries != self.config.initial_queries);

        if reconnect {
            if let Some(connection) = self.connections.current() {
                let report = self.tracker.cleanup_all(connection.driver()).await;
                if !report.is_clean() {
                    warn!(
                        failed = report.failures.len(),
                        "Tracked rows left behind before reconnecting"
                    );
                }
            }
            // The old connection is closed even if the new one fails to open.
            self.state = PopulationState::Unpopulated;
            self.connections.connect(&next).await?;
        }

        self.config = Arc::new(next);
        debug!(reconnected = reconnect, "Configuration replaced");
        Ok(self.config())
    }

    // =========================================================================
    // Assertions and helpers
    // =========================================================================

    /// Insert a row that is removed after the test. Returns the generated id.
    ///
    /// A row that could not be found again for deletion is rejected before
    /// anything is written.
    pub async fn have_in_database(&mut self, table: &str, data: &Criteria) -> DbResult<Option<i64>> {
        let connection = self.require_connection("have_in_database")?;
        let driver = connection.driver();

        FixtureTracker::prepare(driver, table, data).await?;
        let id = driver.insert(table, data).await?;
        self.tracker
            .record_insertion(driver, table, data, id)
            .await?;
        Ok(id)
    }

    /// Insert a row that is left in place. Returns the generated id.
    pub async fn insert_in_database(&self, table: &str, data: &Criteria) -> DbResult<Option<i64>> {
        self.require_connection("insert_in_database")?
            .driver()
            .insert(table, data)
            .await
    }

    /// Assert at least one row matches.
    pub async fn see_in_database(&self, table: &str, criteria: &Criteria) -> DbResult<()> {
        let count = self.grab_num_records(table, criteria).await?;
        if count == 0 {
            return Err(DbError::assertion(format!(
                "No matching records found for criteria {criteria} in table {table}"
            )));
        }
        Ok(())
    }

    /// Assert no row matches.
    pub async fn dont_see_in_database(&self, table: &str, criteria: &Criteria) -> DbResult<()> {
        let count = self.grab_num_records(table, criteria).await?;
        if count > 0 {
            return Err(DbError::assertion(format!(
                "Unexpectedly found {count} matching records for criteria {criteria} in table {table}"
            )));
        }
        Ok(())
    }

    /// Assert exactly `expected` rows match.
    pub async fn see_num_records(
        &self,
        expected: u64,
        table: &str,
        criteria: &Criteria,
    ) -> DbResult<()> {
        let actual = self.grab_num_records(table, criteria).await?;
        if actual != expected {
            return Err(DbError::assertion(format!(
                "Expected {expected} records in table {table} for criteria {criteria}, found {actual}"
            )));
        }
        Ok(())
    }

    pub async fn grab_num_records(&self, table: &str, criteria: &Criteria) -> DbResult<u64> {
        self.require_connection("grab_num_records")?
            .driver()
            .count(table, criteria)
            .await
    }

    /// Value of `column` in the first matching row.
    ///
    /// No match is `NotFound`; a NULL column is `JsonValue::Null`.
    pub async fn grab_from_database(
        &self,
        table: &str,
        column: &str,
        criteria: &Criteria,
    ) -> DbResult<JsonValue> {
        let rows = self
            .require_connection("grab_from_database")?
            .driver()
            .select(column, table, criteria)
            .await?;

        let (Some(row), Some(name)) = (rows.first(), rows.columns.first()) else {
            return Err(DbError::not_found(table, column, criteria.to_string()));
        };
        Ok(row.get(name).cloned().unwrap_or(JsonValue::Null))
    }

    /// Values of `column` in every matching row.
    pub async fn grab_column_from_database(
        &self,
        table: &str,
        column: &str,
        criteria: &Criteria,
    ) -> DbResult<Vec<JsonValue>> {
        let rows = self
            .require_connection("grab_column_from_database")?
            .driver()
            .select(column, table, criteria)
            .await?;

        Ok(match rows.columns.first() {
            Some(name) => rows.column_values(name),
            None => Vec::new(),
        })
    }

    /// First matching row with every column.
    pub async fn grab_entry_from_database(&self, table: &str, criteria: &Criteria) -> DbResult<Row> {
        let rows = self
            .require_connection("grab_entry_from_database")?
            .driver()
            .select("*", table, criteria)
            .await?;

        rows.rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(table, "*", criteria.to_string()))
    }

    /// Every matching row with every column.
    pub async fn grab_entries_from_database(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> DbResult<Vec<Row>> {
        let rows = self
            .require_connection("grab_entries_from_database")?
            .driver()
            .select("*", table, criteria)
            .await?;
        Ok(rows.rows)
    }

    /// Update matching rows. Changes are not tracked or reverted.
    pub async fn update_in_database(
        &self,
        table: &str,
        values: &Criteria,
        criteria: &Criteria,
    ) -> DbResult<u64> {
        self.require_connection("update_in_database")?
            .driver()
            .update(table, values, criteria)
            .await
    }
}
