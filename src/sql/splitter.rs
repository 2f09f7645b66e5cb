//! Statement splitting.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use crate::sql::lexer::{Lexer, TokenKind};
use crate::sql::validator::Rule;

/// An ordered, non-empty-fragment list of statements taken from one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<String>,
}

impl StatementBatch {
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.statements.iter().map(String::as_str).enumerate()
    }

    /// Rejoin the statements into a single script that splits back the same.
    ///
    /// Each separator sits on its own line so a statement ending in a line
    /// comment cannot swallow it.
    pub fn join(&self) -> String {
        self.statements.join("\n;\n")
    }
}

/// Split a script into statements on top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// split. Fragments are trimmed and empty ones dropped. Input that cannot be
/// tokenized (an unterminated literal or comment) is rejected; the reported
/// index is the fragment in which the error starts.
pub fn split(raw: &str, dialect: DatabaseType) -> DbResult<StatementBatch> {
    let mut statements = Vec::new();
    let mut start = 0;

    for token in Lexer::new(raw, dialect) {
        let token = token.map_err(|e| {
            DbError::rejected(statements.len(), Rule::Lexical.as_str(), e.to_string())
        })?;
        if token.kind == TokenKind::Semicolon {
            push_fragment(&mut statements, &raw[start..token.offset]);
            start = token.offset + token.text.len();
        }
    }
    push_fragment(&mut statements, &raw[start..]);

    Ok(StatementBatch { statements })
}

fn push_fragment(statements: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_sqlite(raw: &str) -> Vec<String> {
        split(raw, DatabaseType::SQLite).unwrap().statements().to_vec()
    }

    #[test]
    fn test_split_basic() {
        assert_eq!(
            split_sqlite("SELECT 1; SELECT 2"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_split_drops_empty_fragments() {
        assert_eq!(split_sqlite(" ;; SELECT 1 ;  ; "), vec!["SELECT 1"]);
        assert!(split_sqlite("   ").is_empty());
        assert!(split_sqlite(";").is_empty());
    }

    #[test]
    fn test_split_respects_literals_and_identifiers() {
        assert_eq!(
            split_sqlite("INSERT INTO t VALUES ('a;b'); SELECT \"x;y\" FROM t"),
            vec!["INSERT INTO t VALUES ('a;b')", "SELECT \"x;y\" FROM t"]
        );
    }

    #[test]
    fn test_split_respects_comments() {
        assert_eq!(
            split_sqlite("SELECT 1 /* ; */; SELECT 2 -- ;\n"),
            vec!["SELECT 1 /* ; */", "SELECT 2 -- ;"]
        );
    }

    #[test]
    fn test_split_join_is_stable() {
        let batch = split("SELECT 'a;b' ; UPDATE t SET x = 1;", DatabaseType::SQLite).unwrap();
        let again = split(&batch.join(), DatabaseType::SQLite).unwrap();
        assert_eq!(batch, again);
    }

    #[test]
    fn test_split_join_is_stable_after_line_comment() {
        for dialect in [DatabaseType::SQLite, DatabaseType::MySQL] {
            let batch = split("SELECT 1 -- note\n; SELECT 2; SELECT 3", dialect).unwrap();
            assert_eq!(batch.len(), 3);
            let again = split(&batch.join(), dialect).unwrap();
            assert_eq!(batch, again);
        }

        let batch = split("SELECT 1 # note\n; SELECT 2", DatabaseType::MySQL).unwrap();
        assert_eq!(split(&batch.join(), DatabaseType::MySQL).unwrap(), batch);
    }

    #[test]
    fn test_unterminated_literal_is_rejected_with_fragment_index() {
        let err = split("SELECT 1; SELECT 'oops", DatabaseType::SQLite).unwrap_err();
        match err {
            DbError::ValidationRejected {
                statement_index,
                rule,
                ..
            } => {
                assert_eq!(statement_index, 1);
                assert_eq!(rule, "lexical");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
