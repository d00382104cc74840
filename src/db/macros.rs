//! Database dispatch and criteria macros.
//!
//! This module provides declarative macros that expand to dialect-specific
//! match arms or to `Criteria` literals, keeping call sites linear.

/// Macro for generating database dispatch match arms.
///
/// This macro generates match arms for `DbPool` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Build a [`Criteria`](crate::models::Criteria) from `column => value` pairs.
///
/// Values may be of different types; each goes through `Into<Value>`.
///
/// ```
/// use db_fixture::criteria;
/// use db_fixture::models::Value;
///
/// let c = criteria! { "name" => "john", "enabled" => false, "email" => Value::Null };
/// assert_eq!(c.len(), 3);
/// ```
#[macro_export]
macro_rules! criteria {
    () => {
        $crate::models::Criteria::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::models::Criteria::new()
            $(.with($column, $value))+
    };
}

pub use impl_db_dispatch;
