//! Error types for the fixture engine.
//!
//! This module defines all error types using `thiserror`. Query failures keep
//! the underlying database message verbatim; assertion failures are a separate
//! variant so a test can tell "the query broke" from "the data is wrong".

use thiserror::Error;

/// Coarse classification of a failed query.
///
/// This is a label on [`DbError::Query`], not a separate error: a missing
/// relation is still reported as a query failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The referenced table or view does not exist.
    MissingRelation,
    /// Unique, foreign key, not-null or check constraint violated.
    ConstraintViolation,
    Other,
}

impl QueryErrorKind {
    /// Classify a failure from its SQLSTATE code and message.
    pub fn classify(sql_state: Option<&str>, message: &str) -> Self {
        match sql_state {
            // PostgreSQL undefined_table, MySQL ER_NO_SUCH_TABLE
            Some("42P01") | Some("42S02") => return Self::MissingRelation,
            Some(code) if code.starts_with("23") => return Self::ConstraintViolation,
            _ => {}
        }

        let lower = message.to_lowercase();
        if lower.contains("no such table")
            || (lower.starts_with("relation") && lower.contains("does not exist"))
        {
            Self::MissingRelation
        } else if lower.contains("constraint failed") {
            Self::ConstraintViolation
        } else {
            Self::Other
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Not connected: {operation} requires an open connection")]
    NotConnected { operation: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        kind: QueryErrorKind,
        suggestion: String,
    },

    #[error("Assertion failed: {message}")]
    Assertion { message: String },

    #[error("No rows in '{table}' match {criteria} (column: {column})")]
    NotFound {
        table: String,
        column: String,
        criteria: String,
    },

    #[error("Populator failed: {message}")]
    Populator { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }

    /// Create a query error, classifying it from the SQL state and message.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let kind = QueryErrorKind::classify(sql_state.as_deref(), &message);
        Self::Query {
            message,
            sql_state,
            kind,
            suggestion: suggestion.into(),
        }
    }

    /// Create an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Create a not found error for a grab call that matched nothing.
    pub fn not_found(
        table: impl Into<String>,
        column: impl Into<String>,
        criteria: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            table: table.into(),
            column: column.into(),
            criteria: criteria.into(),
        }
    }

    /// Create a populator error.
    pub fn populator(message: impl Into<String>) -> Self {
        Self::Populator {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Errors that abort the whole suite rather than a single test.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Populator { .. })
    }

    /// Query failures caused by a table or view that does not exist.
    pub fn is_missing_relation(&self) -> bool {
        matches!(
            self,
            Self::Query {
                kind: QueryErrorKind::MissingRelation,
                ..
            }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let message = db_err.message().to_string();
                let mut err = DbError::query(
                    message,
                    code,
                    "Check the SQL syntax and referenced objects",
                );
                if let DbError::Query { kind, .. } = &mut err {
                    match db_err.kind() {
                        sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                        | sqlx::error::ErrorKind::NotNullViolation
                        | sqlx::error::ErrorKind::CheckViolation => {
                            *kind = QueryErrorKind::ConstraintViolation
                        }
                        _ => {}
                    }
                }
                err
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring the connection",
                "Check that the database server is reachable or raise acquire_timeout_secs",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::query(
                format!("Column not found: {}", col),
                None,
                "Check the column name against the table definition",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::query("Syntax error", Some("42601".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::assertion("nope").suggestion(), None);
    }

    #[test]
    fn test_error_fatal() {
        assert!(DbError::connection("err", "sugg").is_fatal());
        assert!(DbError::populator("exit 1").is_fatal());
        assert!(!DbError::query("err", None, "sugg").is_fatal());
        assert!(!DbError::assertion("no rows").is_fatal());
    }

    #[test]
    fn test_missing_relation_from_sql_state() {
        let pg = DbError::query("relation \"users\" does not exist", Some("42P01".into()), "");
        let mysql = DbError::query("Table 'test.users' doesn't exist", Some("42S02".into()), "");
        assert!(pg.is_missing_relation());
        assert!(mysql.is_missing_relation());
    }

    #[test]
    fn test_missing_relation_from_sqlite_message() {
        let err = DbError::query("no such table: users", Some("1".into()), "");
        assert!(err.is_missing_relation());
        assert!(matches!(err, DbError::Query { .. }));
    }

    #[test]
    fn test_constraint_violation_classification() {
        assert_eq!(
            QueryErrorKind::classify(Some("23505"), "duplicate key"),
            QueryErrorKind::ConstraintViolation
        );
        assert_eq!(
            QueryErrorKind::classify(Some("2067"), "UNIQUE constraint failed: users.email"),
            QueryErrorKind::ConstraintViolation
        );
        assert_eq!(
            QueryErrorKind::classify(Some("42601"), "syntax error"),
            QueryErrorKind::Other
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = DbError::not_found("users", "email", "{name = \"nobody\"}");
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("email"));
    }
}
