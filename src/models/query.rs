//! Query-related data models.
//!
//! This module defines the parameter, per-statement and per-batch result
//! types returned by the execution engine.

use crate::error::DbError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Default hard cap on rows returned per statement.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Upper bound accepted for the row cap.
pub const MAX_ROW_LIMIT: u32 = 100_000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default number of rows returned by the sample-data call.
pub const DEFAULT_SAMPLE_ROWS: u32 = 5;

/// A normalized row: column name to JSON scalar, in column order.
///
/// Duplicate column names collapse to one key and the last column wins.
pub type Record = serde_json::Map<String, JsonValue>;

/// A named parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// Named parameters keyed by placeholder name (without the leading `:`).
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Leading command of a statement.
///
/// `Other` only appears when validation is disabled and a statement outside
/// the DML whitelist reaches the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl CommandKind {
    /// Map a leading keyword (any case) to a command.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SELECT" => Some(Self::Select),
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select)
    }
}

/// What one statement produced.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementOutcome {
    /// A row-returning statement (SELECT, or a mutation with RETURNING)
    Rows {
        /// Column names in order. Empty when no rows came back.
        columns: Vec<String>,
        rows: Vec<Record>,
        /// Number of rows returned (after the cap)
        row_count: usize,
        /// True if more rows existed than the row cap allowed
        truncated: bool,
    },
    /// A mutating statement without a result set
    Affected { affected_row_count: u64 },
}

/// Result of one statement in a batch.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatementResult {
    /// Zero-based position in the batch
    pub index: usize,
    pub command: CommandKind,
    #[serde(flatten)]
    pub outcome: StatementOutcome,
}

impl StatementResult {
    /// Rows changed by this statement (RETURNING rows count as changed).
    pub fn affected_rows(&self) -> u64 {
        match &self.outcome {
            StatementOutcome::Affected { affected_row_count } => *affected_row_count,
            StatementOutcome::Rows { row_count, .. } if self.command.is_mutation() => {
                *row_count as u64
            }
            StatementOutcome::Rows { .. } => 0,
        }
    }

    /// Returned rows, if this statement produced a result set.
    pub fn rows(&self) -> Option<&[Record]> {
        match &self.outcome {
            StatementOutcome::Rows { rows, .. } => Some(rows),
            StatementOutcome::Affected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Error,
}

/// Outcome of executing a batch.
///
/// `status` is `error` exactly when the batch was rejected before execution
/// or its transaction was rolled back. In both cases `statements` is empty:
/// nothing the batch did is visible.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub message: String,
    /// One entry per executed statement, in execution order
    pub statements: Vec<StatementResult>,
    /// Sum of rows changed by mutating statements
    pub total_affected_row_count: u64,
    /// Error category when status is "error"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Zero-based index of the statement that caused the failure, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_statement: Option<usize>,
    pub execution_time_ms: u64,
}

impl BatchResult {
    /// Build a successful result from committed statement results.
    pub fn success(statements: Vec<StatementResult>, execution_time_ms: u64) -> Self {
        let total_affected_row_count = statements.iter().map(StatementResult::affected_rows).sum();
        let message = match statements.len() {
            1 => "Executed 1 statement".to_string(),
            n => format!("Executed {} statements", n),
        };
        Self {
            status: BatchStatus::Success,
            message,
            statements,
            total_affected_row_count,
            error_kind: None,
            failed_statement: None,
            execution_time_ms,
        }
    }

    /// Build an error result. No statement effects are reported.
    pub fn failure(err: &DbError, execution_time_ms: u64) -> Self {
        let failed_statement = match err {
            DbError::ValidationRejected {
                statement_index, ..
            } => Some(*statement_index),
            DbError::Execution {
                statement_index, ..
            } => *statement_index,
            _ => None,
        };
        Self {
            status: BatchStatus::Error,
            message: err.to_string(),
            statements: Vec::new(),
            total_affected_row_count: 0,
            error_kind: Some(err.kind().to_string()),
            failed_statement,
            execution_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }

    /// Rows of the first statement, the common single-statement case.
    pub fn first_rows(&self) -> Option<&[Record]> {
        self.statements.first().and_then(StatementResult::rows)
    }
}

/// Per-statement verdict in a validation report.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatementVerdict {
    pub index: usize,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a pure policy check.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValidationReport {
    /// "success" when the check ran; "error" only if the input could not be examined
    pub status: String,
    pub sql: String,
    pub is_valid: bool,
    pub message: String,
    pub statements: Vec<StatementVerdict>,
}
