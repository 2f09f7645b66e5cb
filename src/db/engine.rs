//! The query engine: split, validate, bind and execute.
//!
//! `QueryEngine` is the single entry point the protocol layer talks to. It
//! owns the pool, the policy, the executor and the cached schema, and turns
//! every outcome into a structured result rather than a process failure.

use crate::config::Config;
use crate::db::executor::{PreparedStatement, TransactionalExecutor};
use crate::db::pool::DbPool;
use crate::db::schema::SchemaCache;
use crate::error::{DbError, DbResult};
use crate::models::{
    BatchResult, ConnectionStatus, DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_SAMPLE_ROWS, DatabaseType, ParamMap, SchemaDescription, StatementResult,
    StatementVerdict, ValidationReport,
};
use crate::sql::validator::preview;
use crate::sql::{SafetyValidator, StatementBatch, StatementShape, apply_row_cap, bind_named, split};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Engine behaviour switches, usually derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub validation_enabled: bool,
    pub max_rows: u32,
    /// Append `LIMIT max_rows` to SELECTs that have no limit of their own
    pub row_cap_clause: bool,
    pub query_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            validation_enabled: true,
            max_rows: DEFAULT_MAX_ROWS,
            row_cap_clause: true,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            validation_enabled: config.validation,
            max_rows: config.max_rows,
            row_cap_clause: config.row_cap_clause,
            query_timeout: config.query_timeout_duration(),
        }
    }
}

pub struct QueryEngine {
    pool: DbPool,
    settings: EngineSettings,
    validator: SafetyValidator,
    executor: TransactionalExecutor,
    schema: SchemaCache,
}

impl QueryEngine {
    pub fn new(pool: DbPool, settings: EngineSettings) -> Self {
        let dialect = pool.db_type();
        if !settings.validation_enabled {
            warn!("SQL validation is disabled; statements reach the database unchecked");
        }
        Self {
            validator: SafetyValidator::new(dialect),
            executor: TransactionalExecutor::new(settings.max_rows, settings.query_timeout),
            schema: SchemaCache::new(),
            pool,
            settings,
        }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run the policy over `sql` without executing anything.
    ///
    /// The policy is applied even when validation is disabled for execution.
    pub fn validate(&self, sql: &str) -> ValidationReport {
        let batch = match split(sql, self.dialect()) {
            Ok(batch) => batch,
            Err(err) => {
                let (index, reason) = match &err {
                    DbError::ValidationRejected {
                        statement_index,
                        reason,
                        ..
                    } => (*statement_index, reason.clone()),
                    other => (0, other.to_string()),
                };
                warn!(statement_index = index, reason = %reason, "SQL could not be tokenized");
                return report(
                    sql,
                    vec![StatementVerdict {
                        index,
                        allowed: false,
                        reason: Some(reason),
                    }],
                );
            }
        };

        if batch.is_empty() {
            return ValidationReport {
                status: "success".to_string(),
                sql: sql.to_string(),
                is_valid: false,
                message: "No SQL statements found".to_string(),
                statements: Vec::new(),
            };
        }

        let verdicts = batch
            .iter()
            .map(|(index, statement)| {
                let verdict = self.validator.validate(statement);
                if !verdict.allowed {
                    warn!(
                        rule = ?verdict.rule.map(|r| r.as_str()),
                        statement_index = index,
                        statement = %preview(statement),
                        "Statement failed validation"
                    );
                }
                StatementVerdict {
                    index,
                    allowed: verdict.allowed,
                    reason: verdict.reason,
                }
            })
            .collect();

        report(sql, verdicts)
    }

    /// Execute `sql` as one atomic batch.
    ///
    /// Never fails: rejections and database errors come back as a
    /// `BatchResult` with status `error` and no statement results.
    pub async fn execute(&self, sql: &str, params: Option<&ParamMap>) -> BatchResult {
        let start = Instant::now();
        let outcome = self.run_batch(sql, params).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(statements) => {
                debug!(
                    statements = statements.len(),
                    execution_time_ms = elapsed_ms,
                    "Batch committed"
                );
                BatchResult::success(statements, elapsed_ms)
            }
            Err(err) => {
                debug!(error = %err, kind = err.kind(), "Batch failed");
                BatchResult::failure(&err, elapsed_ms)
            }
        }
    }

    async fn run_batch(
        &self,
        sql: &str,
        params: Option<&ParamMap>,
    ) -> DbResult<Vec<StatementResult>> {
        let batch = split(sql, self.dialect())?;
        if batch.is_empty() {
            return Err(DbError::invalid_input("No SQL statements found"));
        }

        let params = params.filter(|p| !p.is_empty());
        if params.is_some() && batch.len() > 1 {
            return Err(DbError::invalid_input(format!(
                "Parameters can only be used with a single statement, got {} statements",
                batch.len()
            )));
        }

        if self.settings.validation_enabled {
            self.validator.validate_batch(&batch)?;
        } else {
            warn!(
                statements = batch.len(),
                sql = %preview(&batch.join()),
                "Executing batch with validation disabled"
            );
        }

        let prepared = self.prepare(&batch, params)?;
        self.executor.execute(&self.pool, &prepared).await
    }

    fn prepare(
        &self,
        batch: &StatementBatch,
        params: Option<&ParamMap>,
    ) -> DbResult<Vec<PreparedStatement>> {
        let dialect = self.dialect();
        let no_params = ParamMap::new();
        let params = params.unwrap_or(&no_params);

        batch
            .iter()
            .map(|(index, statement)| {
                let shape = StatementShape::of(statement, dialect);
                let statement = if self.settings.row_cap_clause {
                    apply_row_cap(statement, self.settings.max_rows, dialect)
                } else {
                    Cow::Borrowed(statement)
                };
                let bound = bind_named(&statement, params, dialect).map_err(|e| {
                    match e {
                        DbError::InvalidInput { message } => {
                            DbError::invalid_input(format!("Statement {}: {}", index, message))
                        }
                        other => other,
                    }
                })?;

                Ok(PreparedStatement {
                    index,
                    command: shape.command,
                    sql: bound.sql,
                    values: bound.values,
                    returns_rows: shape.returns_rows,
                })
            })
            .collect()
    }

    /// The cached schema, reflecting once if nothing is cached yet.
    pub async fn schema(&self) -> DbResult<Arc<SchemaDescription>> {
        match self.schema.get().await {
            Some(schema) => Ok(schema),
            None => self.schema.refresh(&self.pool).await,
        }
    }

    /// Re-reflect and replace the cached schema.
    pub async fn refresh_schema(&self) -> DbResult<Arc<SchemaDescription>> {
        self.schema.refresh(&self.pool).await
    }

    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        Ok(self.schema().await?.table_names())
    }

    /// Return up to `limit` rows from `table`.
    ///
    /// The table must be present in the cached schema (matched exactly). The
    /// limit defaults to 5 and is clamped to `1..=max_rows`.
    pub async fn sample_data(&self, table: &str, limit: Option<u32>) -> DbResult<BatchResult> {
        let schema = self.schema().await?;
        if !schema.contains_table(table) {
            return Err(DbError::not_found(
                format!("table '{}'", table),
                "Call list_tables to see available tables, or refresh_schema if it was just created",
            ));
        }

        let limit = limit
            .unwrap_or(DEFAULT_SAMPLE_ROWS)
            .clamp(1, self.settings.max_rows);
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.dialect().quote_identifier(table),
            limit
        );
        debug!(table = %table, limit, "Sampling table");

        Ok(self.execute(&sql, None).await)
    }

    /// Check that the database answers and report what is connected.
    pub async fn test_connection(&self) -> ConnectionStatus {
        let dialect = self.dialect();
        let table_count = self
            .schema
            .get()
            .await
            .map(|s| s.table_count())
            .unwrap_or(0);

        match self.pool.ping().await {
            Ok(()) => ConnectionStatus {
                status: "success".to_string(),
                message: format!("Connected to {}", dialect.display_name()),
                database_type: dialect,
                server_version: self.pool.server_version().await,
                table_count,
            },
            Err(err) => {
                warn!(error = %err, "Connection test failed");
                ConnectionStatus {
                    status: "error".to_string(),
                    message: err.to_string(),
                    database_type: dialect,
                    server_version: None,
                    table_count,
                }
            }
        }
    }

    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

fn report(sql: &str, statements: Vec<StatementVerdict>) -> ValidationReport {
    let first_rejection = statements.iter().find(|v| !v.allowed);
    let message = match first_rejection {
        None => "SQL is valid".to_string(),
        Some(v) => format!(
            "SQL contains errors: {}",
            v.reason.as_deref().unwrap_or("statement rejected")
        ),
    };

    ValidationReport {
        status: "success".to_string(),
        sql: sql.to_string(),
        is_valid: first_rejection.is_none(),
        message,
        statements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::models::{BatchStatus, ConnectionConfig, ParamValue};

    async fn memory_engine(settings: EngineSettings) -> QueryEngine {
        let config = ConnectionConfig::new("sqlite::memory:", PoolOptions::default()).unwrap();
        let pool = DbPool::connect(&config).await.unwrap();
        let engine = QueryEngine::new(pool, settings);
        let setup = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)";
        sqlx::query(setup)
            .execute(match engine.pool() {
                DbPool::SQLite(p) => p,
                _ => unreachable!(),
            })
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_validate_report_messages() {
        let engine = memory_engine(EngineSettings::default()).await;

        let report = engine.validate("SELECT id FROM users");
        assert!(report.is_valid);
        assert_eq!(report.message, "SQL is valid");

        let report = engine.validate("SELECT * FROM users; DROP TABLE users;");
        assert!(!report.is_valid);
        assert!(report.message.starts_with("SQL contains errors: "));
        assert_eq!(report.statements.len(), 2);
        assert!(report.statements[0].allowed);
        assert!(!report.statements[1].allowed);

        let report = engine.validate("  ;; ");
        assert!(!report.is_valid);
        assert_eq!(report.message, "No SQL statements found");
    }

    #[tokio::test]
    async fn test_validate_applies_policy_when_execution_validation_off() {
        let engine = memory_engine(EngineSettings {
            validation_enabled: false,
            ..EngineSettings::default()
        })
        .await;
        assert!(!engine.validate("DROP TABLE users").is_valid);
    }

    #[tokio::test]
    async fn test_params_with_multiple_statements_rejected() {
        let engine = memory_engine(EngineSettings::default()).await;
        let mut params = ParamMap::new();
        params.insert("id".into(), ParamValue::Int(1));

        let result = engine
            .execute("SELECT 1; SELECT * FROM users WHERE id = :id", Some(&params))
            .await;
        assert_eq!(result.status, BatchStatus::Error);
        assert_eq!(result.error_kind.as_deref(), Some("invalid_input"));
    }

    #[tokio::test]
    async fn test_row_cap_clause_bounds_select() {
        let engine = memory_engine(EngineSettings {
            max_rows: 2,
            ..EngineSettings::default()
        })
        .await;
        let result = engine
            .execute(
                "INSERT INTO users (name) VALUES ('a'), ('b'), ('c')",
                None,
            )
            .await;
        assert!(result.is_success());

        let result = engine.execute("SELECT name FROM users", None).await;
        assert!(result.is_success());
        assert_eq!(result.first_rows().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sample_data_unknown_table() {
        let engine = memory_engine(EngineSettings::default()).await;
        engine.refresh_schema().await.unwrap();

        let err = engine.sample_data("ghosts", None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_connection_status_reports_dialect() {
        let engine = memory_engine(EngineSettings::default()).await;
        engine.refresh_schema().await.unwrap();

        let status = engine.test_connection().await;
        assert_eq!(status.status, "success");
        assert_eq!(status.database_type, DatabaseType::SQLite);
        assert_eq!(status.table_count, 1);
        assert!(status.server_version.is_some());
    }
}
