//! Dialect-aware driver over a single connection.
//!
//! The driver is the only component that talks to the database. It owns the
//! pool handle, a [`QueryBuilder`] for its dialect and caches of primary keys
//! and column types.

use crate::db::executor::QueryExecutor;
use crate::db::pool::DbPool;
use crate::db::query_builder::{DeleteScope, QueryBuilder, SqlFragment};
use crate::db::schema::SchemaInspector;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnTypes, Criteria, DatabaseType, PrimaryKey, RowSet, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// SQLSTATE PostgreSQL reports when `lastval()` or `currval()` is called before
/// the sequence was used in this session.
const PG_OBJECT_NOT_IN_PREREQUISITE_STATE: &str = "55000";

#[derive(Debug)]
pub struct Driver {
    pool: DbPool,
    builder: QueryBuilder,
    primary_keys: RwLock<HashMap<String, PrimaryKey>>,
    column_types: RwLock<HashMap<String, Arc<ColumnTypes>>>,
}

impl Driver {
    pub fn new(pool: DbPool) -> Self {
        let builder = QueryBuilder::new(pool.db_type());
        Self {
            pool,
            builder,
            primary_keys: RwLock::new(HashMap::new()),
            column_types: RwLock::new(HashMap::new()),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.builder.dialect()
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Quote an identifier for this driver's dialect.
    pub fn quote_identifier(&self, name: &str) -> String {
        self.builder.quote(name)
    }

    /// Run a statement returning rows.
    pub async fn execute_query(&self, sql: &str, params: &[Value]) -> DbResult<RowSet> {
        QueryExecutor::fetch(&self.pool, sql, params).await
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        QueryExecutor::execute(&self.pool, sql, params).await
    }

    async fn fetch_fragment(&self, fragment: &SqlFragment) -> DbResult<RowSet> {
        self.execute_query(&fragment.sql, &fragment.params).await
    }

    async fn execute_fragment(&self, fragment: &SqlFragment) -> DbResult<u64> {
        self.execute(&fragment.sql, &fragment.params).await
    }

    /// Id generated by the most recent insert on this session, if any.
    pub async fn last_insert_id(&self) -> DbResult<Option<i64>> {
        let sql = match self.db_type() {
            DatabaseType::MySQL => "SELECT CAST(LAST_INSERT_ID() AS SIGNED)",
            DatabaseType::SQLite => "SELECT last_insert_rowid()",
            DatabaseType::PostgreSQL => "SELECT lastval()",
        };

        undefined_as_none(QueryExecutor::fetch_i64(&self.pool, sql, &[]).await)
    }

    /// Value the database assigned to the generated key column of the row
    /// just inserted into `table` with `data`.
    ///
    /// `None` when the table has no generated key column or the value was
    /// supplied in `data` as something other than an integer. The session-wide
    /// last insert id is only consulted for a table that really generated it.
    pub async fn generated_id(
        &self,
        table: &str,
        key: &PrimaryKey,
        data: &Criteria,
    ) -> DbResult<Option<i64>> {
        let Some(column) = key.generated() else {
            return Ok(None);
        };
        match data.get(column) {
            Some(Value::Int(id)) => return Ok(Some(*id)),
            Some(value) if !value.is_null() => return Ok(None),
            _ => {}
        }

        match self.db_type() {
            DatabaseType::PostgreSQL => {
                let params = [Value::from(table), Value::from(column)];
                undefined_as_none(
                    QueryExecutor::fetch_i64(
                        &self.pool,
                        "SELECT currval(pg_get_serial_sequence($1, $2))",
                        &params,
                    )
                    .await,
                )
            }
            DatabaseType::MySQL | DatabaseType::SQLite => self.last_insert_id().await,
        }
    }

    /// Primary key of a table, cached until the next `cleanup`.
    pub async fn primary_key_of(&self, table: &str) -> DbResult<PrimaryKey> {
        if let Some(key) = self.primary_keys.read().await.get(table) {
            return Ok(key.clone());
        }

        let key = SchemaInspector::primary_key(&self.pool, table).await?;
        self.primary_keys
            .write()
            .await
            .insert(table.to_string(), key.clone());
        Ok(key)
    }

    /// Declared column types, cached until the next `cleanup`. Empty outside PostgreSQL.
    pub async fn column_types_of(&self, table: &str) -> DbResult<Arc<ColumnTypes>> {
        if let Some(types) = self.column_types.read().await.get(table) {
            return Ok(Arc::clone(types));
        }

        let types = Arc::new(SchemaInspector::column_types(&self.pool, table).await?);
        self.column_types
            .write()
            .await
            .insert(table.to_string(), Arc::clone(&types));
        Ok(types)
    }

    /// Builder for statements against `table`.
    async fn builder_for(&self, table: &str) -> DbResult<QueryBuilder> {
        match self.db_type() {
            DatabaseType::PostgreSQL => Ok(self
                .builder
                .with_column_types(self.column_types_of(table).await?)),
            DatabaseType::MySQL | DatabaseType::SQLite => Ok(self.builder.clone()),
        }
    }

    /// Drop every user object in the database.
    pub async fn cleanup(&self) -> DbResult<()> {
        info!(db_type = %self.db_type(), "Cleaning up database");
        self.primary_keys.write().await.clear();
        self.column_types.write().await.clear();
        SchemaInspector::drop_all(&self.pool).await
    }

    /// Execute statements in order, stopping at the first failure.
    pub async fn load_statements<I, S>(&self, statements: I) -> DbResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut executed = 0;
        for statement in statements {
            self.execute(statement.as_ref(), &[]).await?;
            executed += 1;
        }
        debug!(statements = executed, "Loaded statements");
        Ok(executed)
    }

    /// Insert one row and return its generated key value, if the table has one.
    pub async fn insert(&self, table: &str, data: &Criteria) -> DbResult<Option<i64>> {
        let key = self.primary_key_of(table).await?;
        let builder = self.builder_for(table).await?;
        self.execute_fragment(&builder.insert(table, data)).await?;
        self.generated_id(table, &key, data).await
    }

    pub async fn select(&self, column: &str, table: &str, criteria: &Criteria) -> DbResult<RowSet> {
        let builder = self.builder_for(table).await?;
        self.fetch_fragment(&builder.select(column, table, criteria))
            .await
    }

    pub async fn count(&self, table: &str, criteria: &Criteria) -> DbResult<u64> {
        let fragment = self.builder_for(table).await?.count(table, criteria);
        let count = QueryExecutor::fetch_i64(&self.pool, &fragment.sql, &fragment.params)
            .await?
            .unwrap_or(0);
        u64::try_from(count)
            .map_err(|_| DbError::internal(format!("COUNT(*) returned a negative value: {count}")))
    }

    pub async fn update(&self, table: &str, values: &Criteria, criteria: &Criteria) -> DbResult<u64> {
        if values.is_empty() {
            return Err(DbError::invalid_input(format!(
                "No columns to update in '{table}'"
            )));
        }
        let builder = self.builder_for(table).await?;
        self.execute_fragment(&builder.update(table, values, criteria))
            .await
    }

    pub async fn delete(&self, table: &str, criteria: &Criteria, scope: DeleteScope) -> DbResult<u64> {
        let builder = self.builder_for(table).await?;
        self.execute_fragment(&builder.delete(table, criteria, scope))
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a zero id or PostgreSQL's "not yet defined in this session" to `None`.
fn undefined_as_none(result: DbResult<Option<i64>>) -> DbResult<Option<i64>> {
    match result {
        Ok(id) => Ok(id.filter(|&id| id != 0)),
        Err(DbError::Query {
            sql_state: Some(ref code),
            ..
        }) if code == PG_OBJECT_NOT_IN_PREREQUISITE_STATE => Ok(None),
        Err(e) => Err(e),
    }
}
