//! Schema introspection module.
//!
//! This module provides the introspection the fixture engine needs for
//! SQLite, PostgreSQL, and MySQL: primary key discovery (including which key
//! column the database generates), column types, listing the objects of the
//! current database, and dropping them all on cleanup.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface.

use crate::db::pool::DbPool;
use crate::error::DbResult;
use crate::models::{ColumnTypes, DatabaseType, PrimaryKey, TableInfo, TableType};
use tracing::{debug, info};

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Ordered primary key columns of a table. Empty when it has none.
    pub async fn primary_key(pool: &DbPool, table_name: &str) -> DbResult<PrimaryKey> {
        let key = match pool {
            DbPool::Postgres(p) => postgres::primary_key(p, table_name).await?,
            DbPool::MySql(p) => mysql::primary_key(p, table_name).await?,
            DbPool::SQLite(p) => sqlite::primary_key(p, table_name).await?,
        };
        debug!(
            table = %table_name,
            columns = ?key.columns(),
            generated = ?key.generated(),
            "Resolved primary key"
        );
        Ok(key)
    }

    /// Declared column types. Only PostgreSQL needs them, to cast text parameters;
    /// other dialects get an empty map without a round trip.
    pub async fn column_types(pool: &DbPool, table_name: &str) -> DbResult<ColumnTypes> {
        match pool {
            DbPool::Postgres(p) => postgres::column_types(p, table_name).await,
            DbPool::MySql(_) | DbPool::SQLite(_) => Ok(ColumnTypes::new()),
        }
    }

    /// User tables, views and triggers of the current database.
    pub async fn list_objects(pool: &DbPool) -> DbResult<Vec<TableInfo>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_objects(p).await,
            DbPool::MySql(p) => mysql::list_objects(p).await,
            DbPool::SQLite(p) => sqlite::list_objects(p).await,
        }
    }

    /// Drop every user object so the schema is empty.
    pub async fn drop_all(pool: &DbPool) -> DbResult<()> {
        match pool {
            DbPool::Postgres(p) => postgres::drop_all(p).await?,
            DbPool::MySql(p) => mysql::drop_all(p).await?,
            DbPool::SQLite(p) => sqlite::drop_all(p).await?,
        }
        info!(db_type = %pool.db_type(), "Dropped all schema objects");
        Ok(())
    }
}

fn with_generated(key: PrimaryKey, generated: Option<String>) -> PrimaryKey {
    match generated {
        Some(column) => key.with_generated(column),
        None => key,
    }
}

fn drop_statement(db_type: DatabaseType, object: &TableInfo) -> String {
    format!(
        "DROP {} IF EXISTS {}",
        object.table_type.drop_keyword(),
        db_type.quote_identifier(&object.name)
    )
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Centralized SQL queries for schema introspection. Each database has its own
// submodule with queries adapted to its specific system catalogs.

mod queries {
    pub mod postgres {
        // pg_get_serial_sequence covers both serial and identity columns.
        pub const PRIMARY_KEY: &str = r#"
            SELECT a.attname::text AS column_name,
                pg_get_serial_sequence($1, a.attname) IS NOT NULL AS generated
            FROM pg_index i
            JOIN pg_attribute a
                ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = $1::regclass
            AND i.indisprimary
            ORDER BY array_position(i.indkey::int2[], a.attnum)
            "#;

        pub const COLUMN_TYPES: &str = r#"
            SELECT a.attname::text AS column_name,
                format_type(a.atttypid, NULL) AS column_type
            FROM pg_attribute a
            WHERE a.attrelid = $1::regclass
            AND a.attnum > 0
            AND NOT a.attisdropped
            "#;

        pub const LIST_OBJECTS: &str = r#"
            SELECT table_name::text AS table_name, table_type::text AS table_type
            FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_name
            "#;

        pub const DROP_SCHEMA: &str = "DROP SCHEMA IF EXISTS public CASCADE";
        pub const CREATE_SCHEMA: &str = "CREATE SCHEMA public";
    }

    pub mod mysql {
        pub const PRIMARY_KEY: &str = r#"
            SELECT k.COLUMN_NAME AS COLUMN_NAME, c.EXTRA AS EXTRA
            FROM information_schema.KEY_COLUMN_USAGE k
            JOIN information_schema.COLUMNS c
                ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
                AND c.TABLE_NAME = k.TABLE_NAME
                AND c.COLUMN_NAME = k.COLUMN_NAME
            WHERE k.TABLE_SCHEMA = DATABASE()
            AND k.TABLE_NAME = ?
            AND k.CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY k.ORDINAL_POSITION
            "#;

        pub const LIST_OBJECTS: &str = r#"
            SELECT TABLE_NAME, TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME
            "#;

        pub const DISABLE_FOREIGN_KEYS: &str = "SET FOREIGN_KEY_CHECKS=0";
        pub const ENABLE_FOREIGN_KEYS: &str = "SET FOREIGN_KEY_CHECKS=1";
    }

    pub mod sqlite {
        pub const PRIMARY_KEY: &str =
            "SELECT name, type FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk";

        pub const LIST_OBJECTS: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view', 'trigger')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY CASE type WHEN 'trigger' THEN 0 WHEN 'view' THEN 1 ELSE 2 END, name
            "#;

        pub const DISABLE_FOREIGN_KEYS: &str = "PRAGMA foreign_keys = OFF";
        pub const ENABLE_FOREIGN_KEYS: &str = "PRAGMA foreign_keys = ON";
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{Executor, PgPool, Row};

    pub async fn primary_key(pool: &PgPool, table_name: &str) -> DbResult<PrimaryKey> {
        let rows = sqlx::query(queries::postgres::PRIMARY_KEY)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut generated = None;
        for row in &rows {
            let name: String = row.try_get("column_name")?;
            if row.try_get::<bool, _>("generated")? {
                generated = Some(name.clone());
            }
            columns.push(name);
        }
        Ok(with_generated(PrimaryKey::new(columns), generated))
    }

    pub async fn column_types(pool: &PgPool, table_name: &str) -> DbResult<ColumnTypes> {
        let rows = sqlx::query(queries::postgres::COLUMN_TYPES)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| -> DbResult<(String, String)> {
                Ok((row.try_get("column_name")?, row.try_get("column_type")?))
            })
            .collect()
    }

    pub async fn list_objects(pool: &PgPool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::postgres::LIST_OBJECTS)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("table_name");
                let type_str: String = row.get("table_type");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect())
    }

    /// Recreating the schema takes every table, view, sequence and type with it.
    pub async fn drop_all(pool: &PgPool) -> DbResult<()> {
        pool.execute(queries::postgres::DROP_SCHEMA).await?;
        pool.execute(queries::postgres::CREATE_SCHEMA).await?;
        Ok(())
    }
}

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlPool};

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        use sqlx::Row;
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    pub async fn primary_key(pool: &MySqlPool, table_name: &str) -> DbResult<PrimaryKey> {
        let rows = sqlx::query(queries::mysql::PRIMARY_KEY)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut generated = None;
        for row in &rows {
            let name = get_string(row, "COLUMN_NAME");
            if name.is_empty() {
                continue;
            }
            if get_string(row, "EXTRA").to_lowercase().contains("auto_increment") {
                generated = Some(name.clone());
            }
            columns.push(name);
        }
        Ok(with_generated(PrimaryKey::new(columns), generated))
    }

    pub async fn list_objects(pool: &MySqlPool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::mysql::LIST_OBJECTS)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "TABLE_NAME");
                let type_str = get_string(row, "TABLE_TYPE");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect())
    }

    pub async fn drop_all(pool: &MySqlPool) -> DbResult<()> {
        let objects = list_objects(pool).await?;

        pool.execute(queries::mysql::DISABLE_FOREIGN_KEYS).await?;
        let mut result = Ok(());
        for object in &objects {
            let sql = drop_statement(DatabaseType::MySQL, object);
            debug!(sql = %sql, "Dropping object");
            if let Err(e) = pool.execute(sql.as_str()).await {
                result = Err(e.into());
                break;
            }
        }
        // Restore checks even when a drop failed; the session outlives this call.
        pool.execute(queries::mysql::ENABLE_FOREIGN_KEYS).await?;
        result
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Executor, Row, SqlitePool};

    pub async fn primary_key(pool: &SqlitePool, table_name: &str) -> DbResult<PrimaryKey> {
        let rows = sqlx::query(queries::sqlite::PRIMARY_KEY)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        let columns: Vec<(String, String)> = rows
            .iter()
            .map(|row| -> DbResult<(String, String)> {
                Ok((row.try_get("name")?, row.try_get("type")?))
            })
            .collect::<DbResult<_>>()?;
        let generated = rowid_alias(&columns);
        let key = PrimaryKey::new(columns.into_iter().map(|(name, _)| name).collect());
        Ok(with_generated(key, generated))
    }

    /// A lone `INTEGER PRIMARY KEY` column aliases the rowid.
    pub(super) fn rowid_alias(columns: &[(String, String)]) -> Option<String> {
        match columns {
            [(name, declared)] if declared.eq_ignore_ascii_case("INTEGER") => Some(name.clone()),
            _ => None,
        }
    }

    pub async fn list_objects(pool: &SqlitePool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::sqlite::LIST_OBJECTS)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect())
    }

    pub async fn drop_all(pool: &SqlitePool) -> DbResult<()> {
        let objects = list_objects(pool).await?;

        pool.execute(queries::sqlite::DISABLE_FOREIGN_KEYS).await?;
        let mut result = Ok(());
        for object in &objects {
            let sql = drop_statement(DatabaseType::SQLite, object);
            debug!(sql = %sql, "Dropping object");
            if let Err(e) = pool.execute(sql.as_str()).await {
                result = Err(e.into());
                break;
            }
        }
        pool.execute(queries::sqlite::ENABLE_FOREIGN_KEYS).await?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(columns: &[(&str, &str)]) -> Vec<(String, String)> {
        columns
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_sqlite_rowid_alias_detection() {
        assert_eq!(
            sqlite::rowid_alias(&declared(&[("id", "INTEGER")])),
            Some("id".to_string())
        );
        assert_eq!(
            sqlite::rowid_alias(&declared(&[("id", "integer")])),
            Some("id".to_string())
        );
        // INT is not an alias; the key is an ordinary column.
        assert_eq!(sqlite::rowid_alias(&declared(&[("code", "INT")])), None);
        assert_eq!(
            sqlite::rowid_alias(&declared(&[("group_id", "INTEGER"), ("id", "INTEGER")])),
            None
        );
    }

    #[test]
    fn test_drop_statement_quotes_name() {
        let view = TableInfo::new("active users", TableType::View);
        assert_eq!(
            drop_statement(DatabaseType::SQLite, &view),
            r#"DROP VIEW IF EXISTS "active users""#
        );

        let table = TableInfo::new("orders", TableType::Table);
        assert_eq!(
            drop_statement(DatabaseType::MySQL, &table),
            "DROP TABLE IF EXISTS `orders`"
        );
    }
}
