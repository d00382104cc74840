//! Query execution engine.
//!
//! This module runs parameterized statements against a `DbPool` and converts
//! results into `RowSet`s. There is no timeout layer here: every call runs to
//! completion and any timeout belongs to the underlying client.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific query and write operations
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{RowSet, Value};
use tracing::debug;

/// Query executor that handles statement execution for one pool.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Execute a statement that returns rows.
    pub async fn fetch(pool: &DbPool, sql: &str, params: &[Value]) -> DbResult<RowSet> {
        debug!(sql = %sql, params = params.len(), "Executing query");

        match pool {
            DbPool::MySql(p) => mysql::fetch_rows(p, sql, params).await.map(into_row_set),
            DbPool::Postgres(p) => postgres::fetch_rows(p, sql, params).await.map(into_row_set),
            DbPool::SQLite(p) => sqlite::fetch_rows(p, sql, params).await.map(into_row_set),
        }
    }

    /// Execute a write statement (INSERT, UPDATE, DELETE, DDL) and return affected rows.
    pub async fn execute(pool: &DbPool, sql: &str, params: &[Value]) -> DbResult<u64> {
        debug!(sql = %sql, params = params.len(), "Executing statement");

        let rows_affected = match pool {
            DbPool::MySql(p) => mysql::execute_write(p, sql, params).await?,
            DbPool::Postgres(p) => postgres::execute_write(p, sql, params).await?,
            DbPool::SQLite(p) => sqlite::execute_write(p, sql, params).await?,
        };

        debug!(rows_affected, "Statement executed");
        Ok(rows_affected)
    }

    /// Execute a statement returning a single integer (e.g. `COUNT(*)`).
    pub async fn fetch_i64(pool: &DbPool, sql: &str, params: &[Value]) -> DbResult<Option<i64>> {
        debug!(sql = %sql, params = params.len(), "Executing scalar query");

        match pool {
            DbPool::MySql(p) => mysql::fetch_i64(p, sql, params).await,
            DbPool::Postgres(p) => postgres::fetch_i64(p, sql, params).await,
            DbPool::SQLite(p) => sqlite::fetch_i64(p, sql, params).await,
        }
    }
}

/// Convert rows from any database type into a RowSet.
fn into_row_set<R: RowToJson>(rows: Vec<R>) -> RowSet {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_json_map()).collect();
    RowSet { columns, rows }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(pool: &MySqlPool, sql: &str, params: &[Value]) -> DbResult<Vec<MySqlRow>> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        if params.is_empty() {
            return pool.fetch_all(sql).await.map_err(DbError::from);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        query.fetch_all(pool).await.map_err(DbError::from)
    }

    pub async fn execute_write(pool: &MySqlPool, sql: &str, params: &[Value]) -> DbResult<u64> {
        // Some statements (e.g. CREATE PROCEDURE) cannot be prepared
        let result = if params.is_empty() {
            pool.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(pool).await
        };
        Ok(result?.rows_affected())
    }

    pub async fn fetch_i64(pool: &MySqlPool, sql: &str, params: &[Value]) -> DbResult<Option<i64>> {
        let mut query = sqlx::query_scalar::<_, Option<i64>>(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::String(v) => query.bind(v.as_str()),
                Value::Bytes(v) => query.bind(v.as_slice()),
            };
        }
        Ok(query.fetch_optional(pool).await?.flatten())
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, PgPool};

    pub async fn fetch_rows(pool: &PgPool, sql: &str, params: &[Value]) -> DbResult<Vec<PgRow>> {
        if params.is_empty() {
            return pool.fetch_all(sql).await.map_err(DbError::from);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        query.fetch_all(pool).await.map_err(DbError::from)
    }

    pub async fn execute_write(pool: &PgPool, sql: &str, params: &[Value]) -> DbResult<u64> {
        let result = if params.is_empty() {
            pool.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(pool).await
        };
        Ok(result?.rows_affected())
    }

    pub async fn fetch_i64(pool: &PgPool, sql: &str, params: &[Value]) -> DbResult<Option<i64>> {
        let mut query = sqlx::query_scalar::<_, Option<i64>>(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::String(v) => query.bind(v.as_str()),
                Value::Bytes(v) => query.bind(v.as_slice()),
            };
        }
        Ok(query.fetch_optional(pool).await?.flatten())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(pool: &SqlitePool, sql: &str, params: &[Value]) -> DbResult<Vec<SqliteRow>> {
        if params.is_empty() {
            return pool.fetch_all(sql).await.map_err(DbError::from);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        query.fetch_all(pool).await.map_err(DbError::from)
    }

    pub async fn execute_write(pool: &SqlitePool, sql: &str, params: &[Value]) -> DbResult<u64> {
        let result = if params.is_empty() {
            pool.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(pool).await
        };
        Ok(result?.rows_affected())
    }

    pub async fn fetch_i64(pool: &SqlitePool, sql: &str, params: &[Value]) -> DbResult<Option<i64>> {
        let mut query = sqlx::query_scalar::<_, Option<i64>>(sql);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::String(v) => query.bind(v.as_str()),
                Value::Bytes(v) => query.bind(v.as_slice()),
            };
        }
        Ok(query.fetch_optional(pool).await?.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_row_set_empty() {
        let rows: Vec<sqlx::sqlite::SqliteRow> = Vec::new();
        let set = into_row_set(rows);
        assert!(set.is_empty());
        assert!(set.columns.is_empty());
    }
}
