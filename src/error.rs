//! Error types for the query gateway.
//!
//! Every failure a caller can observe is a `DbError` variant. Each variant
//! carries enough context for an AI assistant to decide what to do next, and
//! none of them are fatal to the process.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Statement {statement_index} rejected by {rule} rule: {reason}")]
    ValidationRejected {
        /// Zero-based position of the statement in its batch
        statement_index: usize,
        rule: String,
        reason: String,
    },

    #[error("Execution error: {message}")]
    Execution {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        /// Position of the failing statement, once known
        statement_index: Option<usize>,
    },

    #[error("Metadata error: {message}")]
    Metadata { message: String },

    #[error("Not found: {object}")]
    NotFound { object: String, hint: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a validation rejection for the statement at `statement_index`.
    pub fn rejected(
        statement_index: usize,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ValidationRejected {
            statement_index,
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            statement_index: None,
        }
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    /// Create a not-found error for a named object.
    pub fn not_found(object: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
            hint: hint.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the failing statement position to an execution error.
    ///
    /// Other variants are returned unchanged.
    pub fn at_statement(self, index: usize) -> Self {
        match self {
            Self::Execution {
                message, sql_state, ..
            } => Self::Execution {
                message,
                sql_state,
                statement_index: Some(index),
            },
            other => other,
        }
    }

    /// Stable snake-case tag for this error, surfaced in structured results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::Execution { .. } => "execution_error",
            Self::Metadata { .. } => "metadata_error",
            Self::NotFound { .. } => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Translation { .. } => "translation_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NotFound { hint, .. } => Some(hint),
            Self::ValidationRejected { .. } => Some(
                "Only single SELECT, INSERT, UPDATE or DELETE statements without comments are accepted",
            ),
            Self::Execution { .. } => Some("Check the SQL syntax and referenced objects"),
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or narrowing the query")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Translation { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::execution("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "The pool is exhausted; retry later or raise max_connections",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Restart the gateway")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::execution(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::execution(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for gateway operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(err: &DbError) -> Option<serde_json::Value> {
    err.suggestion().map(|s| {
        serde_json::json!({
            "suggestion": s,
            "kind": err.kind(),
        })
    })
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(&err);
        match &err {
            DbError::InvalidInput { .. } | DbError::ValidationRejected { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }

            DbError::Execution {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::NotFound { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            DbError::Connection { .. }
            | DbError::Timeout { .. }
            | DbError::Metadata { .. }
            | DbError::Translation { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DbError::rejected(1, "command_whitelist", "DROP is not an allowed command");
        assert_eq!(
            err.to_string(),
            "Statement 1 rejected by command_whitelist rule: DROP is not an allowed command"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::rejected(0, "comment", "comments are not allowed").is_retryable());
        assert!(!DbError::execution("constraint", None).is_retryable());
    }

    #[test]
    fn test_at_statement_only_touches_execution_errors() {
        let err = DbError::execution("UNIQUE constraint failed", Some("2067".into())).at_statement(3);
        assert!(matches!(
            err,
            DbError::Execution {
                statement_index: Some(3),
                ..
            }
        ));

        let err = DbError::invalid_input("bad").at_statement(3);
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(DbError::metadata("x").kind(), "metadata_error");
        assert_eq!(DbError::not_found("t", "h").kind(), "not_found");
        assert_eq!(DbError::translation("x").kind(), "translation_error");
    }

    #[test]
    fn test_validation_rejected_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::rejected(0, "keyword_blacklist", "DROP").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData =
            DbError::not_found("table 'ghosts'", "Call list_tables").into();
        assert_eq!(mcp_err.code.0, -32002);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["suggestion"], "Call list_tables");
        assert_eq!(data["kind"], "not_found");
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try again").into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_execution_error_includes_sql_state() {
        let err = DbError::execution("syntax error", Some("42601".to_string()));
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        assert!(mcp_err.message.contains("42601"));
    }

    #[test]
    fn test_internal_has_no_data() {
        let mcp_err: rmcp::ErrorData = DbError::internal("unknown error").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert!(mcp_err.data.is_none());
    }
}
