//! Named parameter binding.
//!
//! Statements carry `:name` placeholders. Before execution they are rewritten
//! to the driver's positional form (`?` for MySQL and SQLite, `$n` for
//! PostgreSQL) and the values are laid out in placeholder order. Values are
//! never spliced into SQL text.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ParamMap, ParamValue};
use crate::sql::lexer::{TokenKind, tokenize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A statement rewritten for positional binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    /// Values in placeholder order
    pub values: Vec<ParamValue>,
}

/// Rewrite `:name` placeholders and collect their values from `params`.
///
/// A placeholder with no matching key is an error. Keys no placeholder uses
/// are ignored. Driver-native placeholders (`?`, `$1`) are refused so every
/// value goes through the named form.
pub fn bind_named(
    statement: &str,
    params: &ParamMap,
    dialect: DatabaseType,
) -> DbResult<BoundStatement> {
    let tokens = tokenize(statement, dialect).map_err(|e| DbError::invalid_input(e.to_string()))?;

    let mut sql = String::with_capacity(statement.len());
    let mut values = Vec::new();
    let mut pg_positions: HashMap<&str, usize> = HashMap::new();
    let mut used = BTreeSet::new();

    for token in &tokens {
        match token.kind {
            TokenKind::Placeholder => {
                return Err(DbError::invalid_input(format!(
                    "Positional placeholder '{}' is not supported; use :name with params",
                    token.text
                )));
            }
            TokenKind::NamedParameter => {
                let name = &token.text[1..];
                let value = params.get(name).ok_or_else(|| {
                    DbError::invalid_input(format!("Missing value for parameter :{}", name))
                })?;
                used.insert(name);

                match dialect {
                    DatabaseType::PostgreSQL => {
                        let next = pg_positions.len() + 1;
                        let position = *pg_positions.entry(name).or_insert_with(|| {
                            values.push(value.clone());
                            next
                        });
                        sql.push('$');
                        sql.push_str(&position.to_string());
                    }
                    DatabaseType::MySQL | DatabaseType::SQLite => {
                        values.push(value.clone());
                        sql.push('?');
                    }
                }
            }
            _ => sql.push_str(token.text),
        }
    }

    let unused: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|k| !used.contains(k))
        .collect();
    if !unused.is_empty() {
        debug!(unused = ?unused, "Ignoring parameters not referenced by the statement");
    }

    Ok(BoundStatement { sql, values })
}
