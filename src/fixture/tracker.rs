//! Tracking of rows inserted by a test.
//!
//! Each tracked row carries enough to delete exactly that row later: the full
//! primary key when the table has one, otherwise a snapshot of every inserted
//! column. Rows are removed in reverse insertion order so children go before
//! the parents they reference.

use crate::db::{DeleteScope, Driver};
use crate::error::{DbError, DbResult};
use crate::models::{Criteria, PrimaryKey, Value};
use tracing::{debug, info, warn};

/// How a tracked row is found again at delete time.
#[derive(Debug, Clone, PartialEq)]
pub enum RowIdentity {
    /// Values of every primary key column.
    Key(Criteria),
    /// Every column as inserted; used for tables without a primary key.
    Snapshot(Criteria),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertedRow {
    pub table: String,
    pub primary_key: PrimaryKey,
    pub identity: RowIdentity,
}

impl InsertedRow {
    pub fn criteria(&self) -> &Criteria {
        match &self.identity {
            RowIdentity::Key(c) | RowIdentity::Snapshot(c) => c,
        }
    }

    fn delete_scope(&self) -> DeleteScope {
        match self.identity {
            RowIdentity::Key(_) => DeleteScope::Matching,
            // Identical rows may exist; remove only the one we inserted.
            RowIdentity::Snapshot(_) => DeleteScope::Single,
        }
    }
}

/// A tracked row that could not be deleted.
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub table: String,
    pub criteria: String,
    pub error: String,
}

/// Outcome of removing tracked rows after a test.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Rows actually removed.
    pub deleted: u64,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FixtureTracker {
    rows: Vec<InsertedRow>,
}

impl FixtureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[InsertedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve the primary key of `table` and check a row with these columns
    /// could be tracked. Run before inserting, so nothing is written that
    /// cleanup could not remove.
    pub async fn prepare(driver: &Driver, table: &str, inserted: &Criteria) -> DbResult<PrimaryKey> {
        let primary_key = driver.primary_key_of(table).await?;
        check_trackable(table, &primary_key, inserted)?;
        Ok(primary_key)
    }

    /// Record a row just inserted into `table`.
    pub async fn record_insertion(
        &mut self,
        driver: &Driver,
        table: &str,
        inserted: &Criteria,
        generated_id: Option<i64>,
    ) -> DbResult<()> {
        let primary_key = driver.primary_key_of(table).await?;
        if let Some(record) = build_record(table, primary_key, inserted, generated_id)? {
            debug!(table = %table, criteria = %record.criteria(), "Tracking inserted row");
            self.rows.push(record);
        }
        Ok(())
    }

    /// Delete every tracked row, newest first, and forget them.
    ///
    /// Failures are logged and reported; they never stop the remaining deletes.
    pub async fn cleanup_all(&mut self, driver: &Driver) -> CleanupReport {
        let rows = std::mem::take(&mut self.rows);
        let mut report = CleanupReport::default();

        for row in rows.iter().rev() {
            match driver
                .delete(&row.table, row.criteria(), row.delete_scope())
                .await
            {
                Ok(0) => {
                    debug!(table = %row.table, criteria = %row.criteria(), "Tracked row already gone");
                }
                Ok(n) => report.deleted += n,
                Err(e) => {
                    warn!(
                        table = %row.table,
                        criteria = %row.criteria(),
                        error = %e,
                        "Failed to delete tracked row"
                    );
                    report.failures.push(CleanupFailure {
                        table: row.table.clone(),
                        criteria: row.criteria().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !rows.is_empty() {
            info!(
                tracked = rows.len(),
                deleted = report.deleted,
                failed = report.failures.len(),
                "Removed tracked rows"
            );
        }
        report
    }

    /// Forget tracked rows without deleting them. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        count
    }
}

/// Key columns that `inserted` leaves absent or NULL.
fn missing_key_columns<'a>(primary_key: &'a PrimaryKey, inserted: &Criteria) -> Vec<&'a str> {
    primary_key
        .columns()
        .iter()
        .filter(|c| inserted.get(c).is_none_or(Value::is_null))
        .map(String::as_str)
        .collect()
}

/// Check, before inserting, that the row can be found again afterwards.
///
/// Every key column must be supplied, except the one the database generates.
/// Tables without a primary key are tracked by snapshot and always pass.
pub fn check_trackable(table: &str, primary_key: &PrimaryKey, inserted: &Criteria) -> DbResult<()> {
    match missing_key_columns(primary_key, inserted).as_slice() {
        [] => Ok(()),
        [column] if primary_key.generated() == Some(*column) => Ok(()),
        [column] => Err(DbError::invalid_input(format!(
            "Cannot track row in '{table}': primary key column {column} was not provided and is not generated by the database"
        ))),
        columns => Err(DbError::invalid_input(format!(
            "Cannot track row in '{table}': primary key columns {} were not provided",
            columns.join(", ")
        ))),
    }
}

/// Build the record for an inserted row.
///
/// `generated_id` fills the generated key column only. Returns `None` for an
/// empty snapshot, which would match any row.
pub fn build_record(
    table: &str,
    primary_key: PrimaryKey,
    inserted: &Criteria,
    generated_id: Option<i64>,
) -> DbResult<Option<InsertedRow>> {
    if primary_key.is_empty() {
        return Ok(snapshot_record(table, primary_key, inserted));
    }
    check_trackable(table, &primary_key, inserted)?;

    let mut key = Criteria::new();
    for column in primary_key.columns() {
        match (inserted.get(column), generated_id) {
            (Some(value), _) if !value.is_null() => key.insert(column.as_str(), value.clone()),
            (_, Some(id)) => key.insert(column.as_str(), id),
            (_, None) => {
                warn!(table = %table, column = %column, "Generated key value unavailable; tracking row by its inserted columns");
                return match snapshot_record(table, primary_key.clone(), inserted) {
                    Some(record) => Ok(Some(record)),
                    None => Err(DbError::internal(format!(
                        "Row inserted into '{table}' cannot be tracked: no value was generated for {column}"
                    ))),
                };
            }
        }
    }

    Ok(Some(InsertedRow {
        table: table.to_string(),
        primary_key,
        identity: RowIdentity::Key(key),
    }))
}

fn snapshot_record(table: &str, primary_key: PrimaryKey, inserted: &Criteria) -> Option<InsertedRow> {
    if inserted.is_empty() {
        warn!(table = %table, "Row inserted with no columns cannot be told apart from others; not tracked");
        return None;
    }
    Some(InsertedRow {
        table: table.to_string(),
        primary_key,
        identity: RowIdentity::Snapshot(inserted.clone()),
    })
}
