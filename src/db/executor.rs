//! Transactional batch execution.
//!
//! A batch runs inside one database transaction: every statement commits
//! together or none of them does. Each statement gets its own timeout and
//! row-returning statements are fetched as a stream and stopped one row past
//! the row cap, so truncation is detected without reading the full result.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL transaction and statement handling
//! - `postgres`: PostgreSQL transaction and statement handling
//! - `sqlite`: SQLite transaction and statement handling
//!
//! If the future running a batch is dropped (for example because the client
//! cancelled the request) the open transaction is dropped with it, and sqlx
//! rolls it back before the connection returns to the pool.

use crate::db::pool::{DbPool, connection_suggestion};
use crate::db::types::RowToRecord;
use crate::error::{DbError, DbResult};
use crate::models::{
    CommandKind, DatabaseType, MAX_ROW_LIMIT, ParamValue, StatementOutcome, StatementResult,
};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// One statement ready for the database: placeholders already rewritten to
/// the dialect's positional form and values ordered to match.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Zero-based position in the batch
    pub index: usize,
    pub command: CommandKind,
    pub sql: String,
    pub values: Vec<ParamValue>,
    /// Whether the statement produces a result set
    pub returns_rows: bool,
}

/// Per-statement limits applied during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub max_rows: u32,
    pub timeout: Duration,
}

/// Runs statement batches atomically against a pool.
#[derive(Debug, Clone)]
pub struct TransactionalExecutor {
    limits: ExecutionLimits,
}

impl TransactionalExecutor {
    /// `max_rows` is clamped to `[1, MAX_ROW_LIMIT]`.
    pub fn new(max_rows: u32, timeout: Duration) -> Self {
        Self {
            limits: ExecutionLimits {
                max_rows: max_rows.clamp(1, MAX_ROW_LIMIT),
                timeout,
            },
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Execute `statements` in a single transaction.
    ///
    /// On success the results are returned in order after commit. On the
    /// first failure the transaction is rolled back and the error carries
    /// the failing statement's index.
    pub async fn execute(
        &self,
        pool: &DbPool,
        statements: &[PreparedStatement],
    ) -> DbResult<Vec<StatementResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            statements = statements.len(),
            max_rows = self.limits.max_rows,
            timeout_secs = self.limits.timeout.as_secs(),
            "Executing batch"
        );

        match pool {
            DbPool::MySql(p) => mysql::run_batch(p, statements, self.limits).await,
            DbPool::Postgres(p) => postgres::run_batch(p, statements, self.limits).await,
            DbPool::SQLite(p) => sqlite::run_batch(p, statements, self.limits).await,
        }
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

/// Turn up to `max_rows + 1` fetched rows into a capped outcome.
fn rows_outcome<R: RowToRecord>(rows: Vec<R>, index: usize, max_rows: u32) -> StatementOutcome {
    let cap = max_rows as usize;
    let truncated = rows.len() > cap;
    if truncated {
        warn!(statement_index = index, limit = max_rows, "Result truncated at row cap");
    }

    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let records: Vec<_> = rows.iter().take(cap).map(|r| r.to_record()).collect();

    StatementOutcome::Rows {
        columns,
        row_count: records.len(),
        rows: records,
        truncated,
    }
}

fn timeout_error(limit: Duration) -> DbError {
    DbError::timeout("statement execution", limit.as_secs())
}

fn begin_error(db_type: DatabaseType, err: sqlx::Error) -> DbError {
    DbError::connection(
        format!("Failed to start transaction: {}", err),
        connection_suggestion(db_type, &err),
    )
}

fn log_rollback(result: Result<(), sqlx::Error>, index: usize) {
    match result {
        Ok(()) => warn!(statement_index = index, "Batch failed, transaction rolled back"),
        Err(e) => error!(statement_index = index, error = %e, "Rollback failed"),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// The three modules below are kept line-for-line parallel; only the driver
// types differ.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::{Executor, MySqlConnection, MySqlPool};

    pub async fn run_batch(
        pool: &MySqlPool,
        statements: &[PreparedStatement],
        limits: ExecutionLimits,
    ) -> DbResult<Vec<StatementResult>> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| begin_error(DatabaseType::MySQL, e))?;

        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            match run_statement(&mut tx, stmt, limits).await {
                Ok(outcome) => results.push(StatementResult {
                    index: stmt.index,
                    command: stmt.command,
                    outcome,
                }),
                Err(err) => {
                    log_rollback(tx.rollback().await, stmt.index);
                    return Err(err.at_statement(stmt.index));
                }
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(results)
    }

    async fn run_statement(
        conn: &mut MySqlConnection,
        stmt: &PreparedStatement,
        limits: ExecutionLimits,
    ) -> DbResult<StatementOutcome> {
        if stmt.returns_rows {
            let fetch_limit = limits.max_rows as usize + 1;
            // Without values the text protocol is used, which accepts more statement forms
            let rows_future = if stmt.values.is_empty() {
                conn.fetch(stmt.sql.as_str())
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_mysql_param(query, value);
                }
                query.fetch(conn).take(fetch_limit).collect::<Vec<_>>()
            };

            match timeout(limits.timeout, rows_future).await {
                Ok(results) => Ok(rows_outcome(collect_rows(results)?, stmt.index, limits.max_rows)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        } else {
            let result = if stmt.values.is_empty() {
                timeout(limits.timeout, conn.execute(stmt.sql.as_str())).await
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_mysql_param(query, value);
                }
                timeout(limits.timeout, query.execute(conn)).await
            };

            match result {
                Ok(Ok(r)) => Ok(StatementOutcome::Affected {
                    affected_row_count: r.rows_affected(),
                }),
                Ok(Err(e)) => Err(DbError::from(e)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        }
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::{Executor, PgConnection, PgPool};

    pub async fn run_batch(
        pool: &PgPool,
        statements: &[PreparedStatement],
        limits: ExecutionLimits,
    ) -> DbResult<Vec<StatementResult>> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| begin_error(DatabaseType::PostgreSQL, e))?;

        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            match run_statement(&mut tx, stmt, limits).await {
                Ok(outcome) => results.push(StatementResult {
                    index: stmt.index,
                    command: stmt.command,
                    outcome,
                }),
                Err(err) => {
                    log_rollback(tx.rollback().await, stmt.index);
                    return Err(err.at_statement(stmt.index));
                }
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(results)
    }

    async fn run_statement(
        conn: &mut PgConnection,
        stmt: &PreparedStatement,
        limits: ExecutionLimits,
    ) -> DbResult<StatementOutcome> {
        if stmt.returns_rows {
            let fetch_limit = limits.max_rows as usize + 1;
            let rows_future = if stmt.values.is_empty() {
                conn.fetch(stmt.sql.as_str())
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_postgres_param(query, value);
                }
                query.fetch(conn).take(fetch_limit).collect::<Vec<_>>()
            };

            match timeout(limits.timeout, rows_future).await {
                Ok(results) => Ok(rows_outcome(collect_rows(results)?, stmt.index, limits.max_rows)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        } else {
            let result = if stmt.values.is_empty() {
                timeout(limits.timeout, conn.execute(stmt.sql.as_str())).await
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_postgres_param(query, value);
                }
                timeout(limits.timeout, query.execute(conn)).await
            };

            match result {
                Ok(Ok(r)) => Ok(StatementOutcome::Affected {
                    affected_row_count: r.rows_affected(),
                }),
                Ok(Err(e)) => Err(DbError::from(e)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        }
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::{Executor, SqliteConnection, SqlitePool};

    pub async fn run_batch(
        pool: &SqlitePool,
        statements: &[PreparedStatement],
        limits: ExecutionLimits,
    ) -> DbResult<Vec<StatementResult>> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| begin_error(DatabaseType::SQLite, e))?;

        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            match run_statement(&mut tx, stmt, limits).await {
                Ok(outcome) => results.push(StatementResult {
                    index: stmt.index,
                    command: stmt.command,
                    outcome,
                }),
                Err(err) => {
                    log_rollback(tx.rollback().await, stmt.index);
                    return Err(err.at_statement(stmt.index));
                }
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(results)
    }

    async fn run_statement(
        conn: &mut SqliteConnection,
        stmt: &PreparedStatement,
        limits: ExecutionLimits,
    ) -> DbResult<StatementOutcome> {
        if stmt.returns_rows {
            let fetch_limit = limits.max_rows as usize + 1;
            let rows_future = if stmt.values.is_empty() {
                conn.fetch(stmt.sql.as_str())
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_sqlite_param(query, value);
                }
                query.fetch(conn).take(fetch_limit).collect::<Vec<_>>()
            };

            match timeout(limits.timeout, rows_future).await {
                Ok(results) => Ok(rows_outcome(collect_rows(results)?, stmt.index, limits.max_rows)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        } else {
            let result = if stmt.values.is_empty() {
                timeout(limits.timeout, conn.execute(stmt.sql.as_str())).await
            } else {
                let mut query = sqlx::query(&stmt.sql);
                for value in &stmt.values {
                    query = bind_sqlite_param(query, value);
                }
                timeout(limits.timeout, query.execute(conn)).await
            };

            match result {
                Ok(Ok(r)) => Ok(StatementOutcome::Affected {
                    affected_row_count: r.rows_affected(),
                }),
                Ok(Err(e)) => Err(DbError::from(e)),
                Err(_) => Err(timeout_error(limits.timeout)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_row_cap() {
        let exec = TransactionalExecutor::new(0, Duration::from_secs(5));
        assert_eq!(exec.limits().max_rows, 1);

        let exec = TransactionalExecutor::new(u32::MAX, Duration::from_secs(5));
        assert_eq!(exec.limits().max_rows, MAX_ROW_LIMIT);
    }

    #[test]
    fn test_timeout_error_reports_budget() {
        let err = timeout_error(Duration::from_secs(7));
        assert!(matches!(
            err,
            DbError::Timeout {
                elapsed_secs: 7,
                ..
            }
        ));
    }
}
