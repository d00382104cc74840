//! Parameterized SQL generation for criteria-based statements.
//!
//! Every statement the fixture engine issues on behalf of a test goes through
//! [`QueryBuilder`]: identifiers are quoted for the dialect and values become
//! bound parameters. NULL is never bound; it renders as `IS NULL` in filters
//! and as a literal `NULL` in written data.
//!
//! sqlx sends string parameters to PostgreSQL typed as `text`, which the
//! server will not assign or compare to `timestamp`, `uuid`, `json` or enum
//! columns. Given the table's column types, the builder casts those
//! placeholders to the column type (`$1::timestamp without time zone`).

use crate::models::{ColumnTypes, Criteria, DatabaseType, Value};
use std::sync::Arc;

/// SQL text plus the parameters bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<Value>,
}

/// How many rows a DELETE may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    /// Every row matching the criteria.
    Matching,
    /// At most one matching row.
    Single,
}

/// Comparison operator parsed from a criteria key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }

    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::NotEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "like" => Some(Self::Like),
            _ => None,
        }
    }
}

/// Split `"age >"` into `("age", Gt)`. Keys without a known operator are plain columns.
fn split_key(key: &str) -> (&str, Operator) {
    const NOT_LIKE: &str = " not like";

    let trimmed = key.trim();
    let split_at = trimmed.len().saturating_sub(NOT_LIKE.len());
    if let (Some(column), Some(suffix)) = (trimmed.get(..split_at), trimmed.get(split_at..)) {
        if suffix.eq_ignore_ascii_case(NOT_LIKE) {
            return (column.trim_end(), Operator::NotLike);
        }
    }

    match trimmed.rsplit_once(' ') {
        Some((column, word)) => match Operator::parse(word) {
            Some(op) => (column.trim_end(), op),
            None => (trimmed, Operator::Eq),
        },
        None => (trimmed, Operator::Eq),
    }
}

/// Types string parameters accept without a cast.
const TEXT_TYPES: &[&str] = &["text", "character varying", "bpchar", "character", "name"];

/// Dialect-aware SQL builder.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: DatabaseType,
    column_types: Option<Arc<ColumnTypes>>,
}

impl QueryBuilder {
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            column_types: None,
        }
    }

    /// Builder for one table whose column types are known.
    ///
    /// Only PostgreSQL uses them; string parameters bound to a non-text
    /// column are cast to that column's type.
    pub fn with_column_types(&self, column_types: Arc<ColumnTypes>) -> Self {
        Self {
            dialect: self.dialect,
            column_types: Some(column_types),
        }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    fn column_expr(&self, column: &str) -> String {
        if column == "*" {
            column.to_string()
        } else {
            self.quote(column)
        }
    }

    /// Build a WHERE clause (including the keyword) for the criteria.
    ///
    /// `offset` is the number of parameters already bound ahead of this clause,
    /// which matters for PostgreSQL's numbered placeholders. Empty criteria
    /// produce an empty clause.
    pub fn build_where(&self, criteria: &Criteria, offset: usize) -> SqlFragment {
        let mut conditions = Vec::with_capacity(criteria.len());
        let mut params = Vec::new();

        for (key, value) in criteria.iter() {
            let (name, op) = split_key(key);
            let column = self.quote(name);

            if value.is_null() {
                let test = if op == Operator::NotEq {
                    "IS NOT NULL"
                } else {
                    "IS NULL"
                };
                conditions.push(format!("{column} {test}"));
                continue;
            }

            let placeholder = match op {
                // LIKE patterns are text whatever the column type.
                Operator::Like | Operator::NotLike => self.bind(None, value, offset, &mut params),
                _ => self.bind(Some(name), value, offset, &mut params),
            };
            conditions.push(format!("{column} {} {placeholder}", op.as_sql()));
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        SqlFragment { sql, params }
    }

    /// `SELECT column FROM table WHERE ...`. A column of `*` is left unquoted.
    pub fn select(&self, column: &str, table: &str, criteria: &Criteria) -> SqlFragment {
        let filter = self.build_where(criteria, 0);
        SqlFragment {
            sql: join_clauses(&[
                format!("SELECT {} FROM {}", self.column_expr(column), self.quote(table)),
                filter.sql,
            ]),
            params: filter.params,
        }
    }

    /// `SELECT COUNT(*) FROM table WHERE ...`.
    pub fn count(&self, table: &str, criteria: &Criteria) -> SqlFragment {
        let filter = self.build_where(criteria, 0);
        SqlFragment {
            sql: join_clauses(&[
                format!("SELECT COUNT(*) FROM {}", self.quote(table)),
                filter.sql,
            ]),
            params: filter.params,
        }
    }

    /// `INSERT INTO table (cols) VALUES (...)`.
    ///
    /// Empty data inserts a row of defaults.
    pub fn insert(&self, table: &str, data: &Criteria) -> SqlFragment {
        let table = self.quote(table);
        if data.is_empty() {
            let sql = match self.dialect {
                DatabaseType::MySQL => format!("INSERT INTO {table} () VALUES ()"),
                DatabaseType::PostgreSQL | DatabaseType::SQLite => {
                    format!("INSERT INTO {table} DEFAULT VALUES")
                }
            };
            return SqlFragment {
                sql,
                params: Vec::new(),
            };
        }

        let columns: Vec<String> = data.keys().map(|c| self.quote(c)).collect();
        let mut params = Vec::with_capacity(data.len());
        let values: Vec<String> = data
            .iter()
            .map(|(column, value)| self.bind(Some(column), value, 0, &mut params))
            .collect();

        SqlFragment {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                values.join(", ")
            ),
            params,
        }
    }

    /// Placeholder for a value, or the literal `NULL`.
    ///
    /// PostgreSQL types a bound NULL by the Rust type it came from, which
    /// breaks inserts into non-text columns, so NULL is never bound.
    fn bind(
        &self,
        column: Option<&str>,
        value: &Value,
        offset: usize,
        params: &mut Vec<Value>,
    ) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        params.push(value.clone());
        let placeholder = self.dialect.placeholder(offset + params.len());
        match (value, column.and_then(|c| self.cast_for(c))) {
            (Value::String(_), Some(ty)) => format!("{placeholder}::{ty}"),
            _ => placeholder,
        }
    }

    /// Type a string parameter for `column` must be cast to, if any.
    fn cast_for(&self, column: &str) -> Option<&str> {
        if self.dialect != DatabaseType::PostgreSQL {
            return None;
        }
        let ty = self.column_types.as_ref()?.get(column)?;
        (!TEXT_TYPES.contains(&ty.as_str())).then_some(ty.as_str())
    }

    /// `UPDATE table SET ... WHERE ...`; SET parameters come first.
    pub fn update(&self, table: &str, values: &Criteria, criteria: &Criteria) -> SqlFragment {
        let mut params = Vec::with_capacity(values.len() + criteria.len());
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    self.quote(column),
                    self.bind(Some(column), value, 0, &mut params)
                )
            })
            .collect();

        let filter = self.build_where(criteria, params.len());
        params.extend(filter.params);

        SqlFragment {
            sql: join_clauses(&[
                format!(
                    "UPDATE {} SET {}",
                    self.quote(table),
                    assignments.join(", ")
                ),
                filter.sql,
            ]),
            params,
        }
    }

    /// `DELETE FROM table WHERE ...`, optionally limited to a single row.
    pub fn delete(&self, table: &str, criteria: &Criteria, scope: DeleteScope) -> SqlFragment {
        let quoted = self.quote(table);
        let filter = self.build_where(criteria, 0);

        let sql = match (scope, self.dialect) {
            (DeleteScope::Matching, _) => {
                join_clauses(&[format!("DELETE FROM {quoted}"), filter.sql])
            }
            (DeleteScope::Single, DatabaseType::MySQL) => {
                join_clauses(&[format!("DELETE FROM {quoted}"), filter.sql, "LIMIT 1".into()])
            }
            (DeleteScope::Single, DatabaseType::SQLite) => {
                single_row_delete(&quoted, "rowid", &filter.sql)
            }
            (DeleteScope::Single, DatabaseType::PostgreSQL) => {
                single_row_delete(&quoted, "ctid", &filter.sql)
            }
        };

        SqlFragment {
            sql,
            params: filter.params,
        }
    }
}

fn single_row_delete(table: &str, locator: &str, filter: &str) -> String {
    let inner = join_clauses(&[
        format!("SELECT {locator} FROM {table}"),
        filter.to_string(),
        "LIMIT 1".into(),
    ]);
    format!("DELETE FROM {table} WHERE {locator} IN ({inner})")
}

fn join_clauses(parts: &[String]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria;

    fn sqlite() -> QueryBuilder {
        QueryBuilder::new(DatabaseType::SQLite)
    }

    fn postgres() -> QueryBuilder {
        QueryBuilder::new(DatabaseType::PostgreSQL)
    }

    fn mysql() -> QueryBuilder {
        QueryBuilder::new(DatabaseType::MySQL)
    }

    fn typed(builder: QueryBuilder) -> QueryBuilder {
        let types: ColumnTypes = [
            ("name", "character varying"),
            ("created_at", "timestamp without time zone"),
            ("id", "integer"),
        ]
        .into_iter()
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect();
        builder.with_column_types(Arc::new(types))
    }

    #[test]
    fn test_postgres_casts_strings_for_typed_columns() {
        let builder = typed(postgres());
        let data = criteria! { "name" => "john", "created_at" => "2020-01-01 10:00:00", "id" => 7 };
        let insert = builder.insert("users", &data);
        assert_eq!(
            insert.sql,
            r#"INSERT INTO "users" ("name", "created_at", "id") VALUES ($1, $2::timestamp without time zone, $3)"#
        );

        let filter = builder.build_where(
            &criteria! { "created_at >=" => "2020-01-01", "created_at like" => "2020%", "id" => "7" },
            0,
        );
        assert_eq!(
            filter.sql,
            r#"WHERE "created_at" >= $1::timestamp without time zone AND "created_at" LIKE $2 AND "id" = $3::integer"#
        );

        let update = builder.update(
            "users",
            &criteria! { "created_at" => "2021-05-05" },
            &criteria! { "name" => "john" },
        );
        assert_eq!(
            update.sql,
            r#"UPDATE "users" SET "created_at" = $1::timestamp without time zone WHERE "name" = $2"#
        );
    }

    #[test]
    fn test_column_types_ignored_outside_postgres() {
        let data = criteria! { "created_at" => "2020-01-01" };
        assert_eq!(
            typed(sqlite()).insert("users", &data).sql,
            r#"INSERT INTO "users" ("created_at") VALUES (?)"#
        );
        assert_eq!(
            typed(mysql()).insert("users", &data).sql,
            "INSERT INTO `users` (`created_at`) VALUES (?)"
        );
    }

    #[test]
    fn test_where_null_has_no_param() {
        let c = criteria! { "name" => "john", "email" => Value::Null };
        let frag = sqlite().build_where(&c, 0);
        assert_eq!(frag.sql, r#"WHERE "name" = ? AND "email" IS NULL"#);
        assert_eq!(frag.params, vec![Value::from("john")]);
    }

    #[test]
    fn test_where_empty_criteria() {
        let frag = sqlite().build_where(&Criteria::new(), 0);
        assert!(frag.sql.is_empty());
        assert!(frag.params.is_empty());
    }

    #[test]
    fn test_where_operators() {
        let c = criteria! {
            "age >" => 18,
            "name like" => "da%",
            "email NOT LIKE" => "%@spam.com",
            "deleted_at !=" => Value::Null,
        };
        let frag = sqlite().build_where(&c, 0);
        assert_eq!(
            frag.sql,
            r#"WHERE "age" > ? AND "name" LIKE ? AND "email" NOT LIKE ? AND "deleted_at" IS NOT NULL"#
        );
        assert_eq!(frag.params.len(), 3);
    }

    #[test]
    fn test_unknown_trailing_word_is_column() {
        assert_eq!(split_key("created at"), ("created at", Operator::Eq));
        assert_eq!(split_key("id <>"), ("id", Operator::NotEq));
        assert_eq!(split_key("id"), ("id", Operator::Eq));
    }

    #[test]
    fn test_postgres_numbering_with_offset() {
        let c = criteria! { "a" => 1, "b" => Value::Null, "c" => 3 };
        let frag = postgres().build_where(&c, 2);
        assert_eq!(frag.sql, r#"WHERE "a" = $3 AND "b" IS NULL AND "c" = $4"#);
    }

    #[test]
    fn test_select_and_count() {
        let c = criteria! { "name" => "davert" };
        assert_eq!(
            mysql().select("email", "users", &c).sql,
            "SELECT `email` FROM `users` WHERE `name` = ?"
        );
        assert_eq!(
            sqlite().select("*", "users", &Criteria::new()).sql,
            r#"SELECT * FROM "users""#
        );
        assert_eq!(
            postgres().count("public.users", &c).sql,
            r#"SELECT COUNT(*) FROM "public"."users" WHERE "name" = $1"#
        );
    }

    #[test]
    fn test_insert() {
        let data = criteria! { "name" => "john", "email" => "john@jon.com" };
        let frag = postgres().insert("users", &data);
        assert_eq!(
            frag.sql,
            r#"INSERT INTO "users" ("name", "email") VALUES ($1, $2)"#
        );
        assert_eq!(frag.params.len(), 2);
    }

    #[test]
    fn test_null_values_are_literal() {
        let data = criteria! { "name" => "ghost", "email" => Value::Null, "age" => 3 };
        let frag = postgres().insert("users", &data);
        assert_eq!(
            frag.sql,
            r#"INSERT INTO "users" ("name", "email", "age") VALUES ($1, NULL, $2)"#
        );
        assert_eq!(frag.params, vec![Value::from("ghost"), Value::Int(3)]);

        let frag = postgres().update("users", &criteria! { "email" => Value::Null }, &criteria! { "id" => 1 });
        assert_eq!(frag.sql, r#"UPDATE "users" SET "email" = NULL WHERE "id" = $1"#);
    }

    #[test]
    fn test_insert_defaults() {
        assert_eq!(
            sqlite().insert("t", &Criteria::new()).sql,
            r#"INSERT INTO "t" DEFAULT VALUES"#
        );
        assert_eq!(mysql().insert("t", &Criteria::new()).sql, "INSERT INTO `t` () VALUES ()");
    }

    #[test]
    fn test_update_set_params_before_where() {
        let values = criteria! { "status" => "done" };
        let c = criteria! { "id" => 7 };
        let frag = postgres().update("tasks", &values, &c);
        assert_eq!(
            frag.sql,
            r#"UPDATE "tasks" SET "status" = $1 WHERE "id" = $2"#
        );
        assert_eq!(frag.params, vec![Value::from("done"), Value::Int(7)]);
    }

    #[test]
    fn test_delete_single_row_per_dialect() {
        let c = criteria! { "name" => "x" };
        assert_eq!(
            mysql().delete("no_pk", &c, DeleteScope::Single).sql,
            "DELETE FROM `no_pk` WHERE `name` = ? LIMIT 1"
        );
        assert_eq!(
            sqlite().delete("no_pk", &c, DeleteScope::Single).sql,
            r#"DELETE FROM "no_pk" WHERE rowid IN (SELECT rowid FROM "no_pk" WHERE "name" = ? LIMIT 1)"#
        );
        assert_eq!(
            postgres().delete("no_pk", &c, DeleteScope::Single).sql,
            r#"DELETE FROM "no_pk" WHERE ctid IN (SELECT ctid FROM "no_pk" WHERE "name" = $1 LIMIT 1)"#
        );
        assert_eq!(
            sqlite().delete("no_pk", &c, DeleteScope::Matching).sql,
            r#"DELETE FROM "no_pk" WHERE "name" = ?"#
        );
    }

    #[test]
    fn test_identifier_quote_escaping() {
        assert_eq!(mysql().quote("we`ird"), "`we``ird`");
        assert_eq!(sqlite().quote(r#"we"ird"#), r#""we""ird""#);
    }
}
