//! SQL dump loading.
//!
//! A dump is split line by line: a statement ends at a line whose trimmed
//! text ends with the current delimiter (`;` unless changed by a MySQL
//! `DELIMITER` directive). Lines starting with `--` or `#` are comments.

use crate::error::{DbError, DbResult};
use std::path::Path;

const DEFAULT_DELIMITER: &str = ";";

/// Read a dump file and split it into executable statements.
pub async fn read_statements(path: &Path) -> DbResult<Vec<String>> {
    let sql = tokio::fs::read_to_string(path).await.map_err(|e| {
        DbError::populator(format!("Cannot read dump '{}': {}", path.display(), e))
    })?;
    Ok(split_statements(&sql))
}

/// Split SQL text into statements, dropping comments and delimiters.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut delimiter = DEFAULT_DELIMITER.to_string();
    let mut buffer = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") || trimmed.starts_with('#') {
            continue;
        }

        if let Some(new_delimiter) = parse_delimiter_directive(trimmed) {
            delimiter = new_delimiter.to_string();
            continue;
        }

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(line.trim_end());

        if trimmed.ends_with(delimiter.as_str()) {
            let end = buffer.len() - delimiter.len();
            let statement = buffer[..end].trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            buffer.clear();
        }
    }

    let rest = buffer.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

fn parse_delimiter_directive(line: &str) -> Option<&str> {
    let (keyword, rest) = line.split_once(char::is_whitespace)?;
    if !keyword.eq_ignore_ascii_case("delimiter") {
        return None;
    }
    let delimiter = rest.trim();
    (!delimiter.is_empty()).then_some(delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_statements() {
        let sql = "CREATE TABLE users (id INTEGER);\nINSERT INTO users VALUES (1);\n";
        assert_eq!(
            split_statements(sql),
            vec!["CREATE TABLE users (id INTEGER)", "INSERT INTO users VALUES (1)"]
        );
    }

    #[test]
    fn test_split_skips_comments_and_blank_lines() {
        let sql = "-- users table\n# mysql style\n\nCREATE TABLE t (\n  id INTEGER\n);\n";
        assert_eq!(split_statements(sql), vec!["CREATE TABLE t (\n  id INTEGER\n)"]);
    }

    #[test]
    fn test_semicolon_inside_line_does_not_split() {
        let sql = "INSERT INTO t VALUES ('a;b');\n";
        assert_eq!(split_statements(sql), vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn test_delimiter_directive() {
        let sql = "DELIMITER //\nCREATE TRIGGER trg BEFORE INSERT ON t\nFOR EACH ROW BEGIN\n  SET NEW.a = 1;\nEND//\nDELIMITER ;\nSELECT 1;\n";
        assert_eq!(
            split_statements(sql),
            vec![
                "CREATE TRIGGER trg BEFORE INSERT ON t\nFOR EACH ROW BEGIN\n  SET NEW.a = 1;\nEND",
                "SELECT 1",
            ]
        );
    }

    #[test]
    fn test_trailing_statement_without_delimiter() {
        assert_eq!(split_statements("SELECT 1;\nSELECT 2"), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_empty_dump() {
        assert!(split_statements("-- nothing here\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_populator_error() {
        let result = read_statements(Path::new("/nonexistent/dump.sql")).await;
        assert!(matches!(result, Err(DbError::Populator { .. })));
    }
}
