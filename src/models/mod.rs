//! Data models for the query gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionStatus, DatabaseType};
pub use query::{
    BatchResult, BatchStatus, CommandKind, DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS,
    DEFAULT_SAMPLE_ROWS, MAX_ROW_LIMIT, ParamMap, ParamValue, Record, StatementOutcome,
    StatementResult, StatementVerdict, ValidationReport,
};
pub use schema::{ColumnDescription, SchemaDescription, TableDescription};
