//! Statement classification and the row-cap rewrite.

use crate::models::{CommandKind, DatabaseType};
use crate::sql::lexer::{Token, TokenKind, tokenize};
use std::borrow::Cow;

/// Leading words of non-DML statements that still produce a result set.
/// Only reachable with validation disabled.
const ROW_RETURNING_OTHERS: &[&str] = &[
    "WITH", "VALUES", "SHOW", "EXPLAIN", "PRAGMA", "DESCRIBE", "DESC", "TABLE",
];

/// What a statement is and how it must be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementShape {
    pub command: CommandKind,
    /// Whether the statement yields rows (SELECT, or DML with RETURNING)
    pub returns_rows: bool,
    /// Whether the statement already bounds its own result size
    pub has_row_limit: bool,
}

impl StatementShape {
    /// Classify a statement. Text the lexer cannot read is treated as an
    /// opaque non-returning command.
    pub fn of(statement: &str, dialect: DatabaseType) -> Self {
        let Ok(tokens) = tokenize(statement, dialect) else {
            return Self {
                command: CommandKind::Other,
                returns_rows: false,
                has_row_limit: false,
            };
        };
        let words: Vec<&Token<'_>> = tokens
            .iter()
            .filter(|t| !t.is_whitespace() && !t.is_comment())
            .collect();

        let leading = words.first().filter(|t| t.kind == TokenKind::Word);
        let command = leading
            .and_then(|t| CommandKind::from_keyword(t.text))
            .unwrap_or(CommandKind::Other);

        let returns_rows = match command {
            CommandKind::Select => true,
            CommandKind::Other => leading.is_some_and(|t| {
                ROW_RETURNING_OTHERS
                    .iter()
                    .any(|kw| t.text.eq_ignore_ascii_case(kw))
            }),
            _ => words.iter().any(|t| t.is_keyword("RETURNING")),
        };

        let has_row_limit = words.iter().enumerate().any(|(i, t)| {
            t.is_keyword("LIMIT")
                || t.is_keyword("FETCH")
                || t.is_keyword("OFFSET")
                || (t.is_keyword("FOR")
                    && words
                        .get(i + 1)
                        .is_some_and(|n| n.is_keyword("UPDATE") || n.is_keyword("SHARE")))
        });

        Self {
            command,
            returns_rows,
            has_row_limit,
        }
    }
}

/// Append `LIMIT cap` to a SELECT that has no limit of its own.
///
/// Statements that already carry LIMIT, FETCH or OFFSET, or that lock rows,
/// are returned unchanged, as is anything that is not a SELECT.
pub fn apply_row_cap(statement: &str, cap: u32, dialect: DatabaseType) -> Cow<'_, str> {
    let shape = StatementShape::of(statement, dialect);
    if shape.command != CommandKind::Select || shape.has_row_limit {
        return Cow::Borrowed(statement);
    }

    let ends_in_line_comment = tokenize(statement, dialect)
        .ok()
        .and_then(|tokens| tokens.into_iter().rev().find(|t| !t.is_whitespace()))
        .is_some_and(|t| t.kind == TokenKind::LineComment);
    let separator = if ends_in_line_comment { "\n" } else { " " };

    Cow::Owned(format!("{}{}LIMIT {}", statement.trim_end(), separator, cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_of_dml() {
        let shape = StatementShape::of("select * from t", DatabaseType::SQLite);
        assert_eq!(shape.command, CommandKind::Select);
        assert!(shape.returns_rows);

        let shape = StatementShape::of("UPDATE t SET a = 1", DatabaseType::SQLite);
        assert_eq!(shape.command, CommandKind::Update);
        assert!(!shape.returns_rows);

        let shape = StatementShape::of(
            "INSERT INTO t (a) VALUES (1) RETURNING id",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(shape.command, CommandKind::Insert);
        assert!(shape.returns_rows);
    }

    #[test]
    fn test_returning_inside_literal_does_not_count() {
        let shape = StatementShape::of(
            "INSERT INTO t (a) VALUES ('RETURNING')",
            DatabaseType::SQLite,
        );
        assert!(!shape.returns_rows);
    }

    #[test]
    fn test_shape_of_other() {
        let shape = StatementShape::of("CREATE TABLE t (a INT)", DatabaseType::SQLite);
        assert_eq!(shape.command, CommandKind::Other);
        assert!(!shape.returns_rows);

        let shape = StatementShape::of("PRAGMA table_info(t)", DatabaseType::SQLite);
        assert!(shape.returns_rows);
    }

    #[test]
    fn test_row_cap_appended() {
        assert_eq!(
            apply_row_cap("SELECT * FROM t", 1000, DatabaseType::SQLite),
            "SELECT * FROM t LIMIT 1000"
        );
    }

    #[test]
    fn test_row_cap_respects_existing_limits() {
        for sql in [
            "SELECT * FROM t LIMIT 5",
            "SELECT * FROM t ORDER BY a OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY",
            "SELECT * FROM t FOR UPDATE",
        ] {
            assert_eq!(apply_row_cap(sql, 10, DatabaseType::PostgreSQL), sql);
        }
    }

    #[test]
    fn test_row_cap_skips_non_select() {
        let sql = "DELETE FROM t";
        assert!(matches!(
            apply_row_cap(sql, 10, DatabaseType::SQLite),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_row_cap_after_line_comment() {
        assert_eq!(
            apply_row_cap("SELECT 1 -- note", 3, DatabaseType::SQLite),
            "SELECT 1 -- note\nLIMIT 3"
        );
    }

    #[test]
    fn test_limit_in_string_is_ignored() {
        assert_eq!(
            apply_row_cap("SELECT 'LIMIT 1'", 2, DatabaseType::SQLite),
            "SELECT 'LIMIT 1' LIMIT 2"
        );
    }
}
