//! Schema-related data models.
//!
//! Only the parts of a schema the fixture engine needs: primary keys for
//! tracking inserted rows and the list of objects to drop on cleanup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordered list of columns forming a table's primary key.
///
/// Empty when the table has no primary key. `generated` names the key column
/// whose value the database assigns on insert (auto-increment, serial or
/// identity column, SQLite rowid alias), if there is one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    columns: Vec<String>,
    generated: Option<String>,
}

impl PrimaryKey {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            generated: None,
        }
    }

    /// Mark a key column as generated by the database. Unknown columns are ignored.
    pub fn with_generated(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if self.columns.contains(&column) {
            self.generated = Some(column);
        }
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn generated(&self) -> Option<&str> {
        self.generated.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True for keys made of more than one column.
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}

impl<S: Into<String>> FromIterator<S> for PrimaryKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Declared column types of a table, by column name.
pub type ColumnTypes = HashMap<String, String>;

/// Type of database table object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    Trigger,
}

impl TableType {
    /// Parse table type from database-specific string.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "view" | "system view" => Self::View,
            "trigger" => Self::Trigger,
            _ => Self::Table,
        }
    }

    /// Keyword used in `DROP <keyword>` statements.
    pub fn drop_keyword(&self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Trigger => "TRIGGER",
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::Trigger => write!(f, "trigger"),
        }
    }
}

/// A schema object found during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub table_type: TableType,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            table_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_shapes() {
        let none = PrimaryKey::default();
        let single: PrimaryKey = ["id"].into_iter().collect();
        let composite: PrimaryKey = ["group_id", "id"].into_iter().collect();

        assert!(none.is_empty());
        assert!(!single.is_composite());
        assert!(composite.is_composite());
        assert_eq!(composite.columns(), &["group_id".to_string(), "id".to_string()]);
        assert_eq!(composite.generated(), None);
    }

    #[test]
    fn test_generated_column_must_be_part_of_key() {
        let key: PrimaryKey = ["id"].into_iter().collect();
        assert_eq!(key.clone().with_generated("id").generated(), Some("id"));
        assert_eq!(key.with_generated("name").generated(), None);
    }

    #[test]
    fn test_table_type_parsing() {
        assert_eq!(TableType::parse("BASE TABLE"), TableType::Table);
        assert_eq!(TableType::parse("table"), TableType::Table);
        assert_eq!(TableType::parse("VIEW"), TableType::View);
        assert_eq!(TableType::parse("trigger"), TableType::Trigger);
        assert_eq!(TableType::View.drop_keyword(), "VIEW");
    }
}
