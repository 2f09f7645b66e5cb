//! Query tools: natural-language query, raw execution and validation.

use crate::db::QueryEngine;
use crate::error::DbError;
use crate::llm::SqlTranslator;
use crate::models::{BatchResult, ParamMap, ValidationReport};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Input for the db_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NlQueryInput {
    /// What you want to know or change, in plain language (e.g. "users older than 30")
    pub prompt: String,
}

/// Output from the db_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct NlQueryOutput {
    /// SQL produced by the language model; null if translation failed
    pub generated_sql: Option<String>,
    #[serde(flatten)]
    pub result: BatchResult,
}

/// Input for the execute_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteSqlInput {
    /// One or more SQL statements separated by `;`. All run in one transaction.
    pub sql: String,
    /// Named parameters for `:name` placeholders. Only allowed with a single statement.
    #[serde(default)]
    pub params: Option<ParamMap>,
}

/// Input for the validate_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateSqlInput {
    /// SQL to check against the safety policy. Nothing is executed.
    pub sql: String,
}

/// Handler for the query tools.
pub struct QueryToolHandler {
    engine: Arc<QueryEngine>,
    translator: Arc<dyn SqlTranslator>,
}

impl QueryToolHandler {
    pub fn new(engine: Arc<QueryEngine>, translator: Arc<dyn SqlTranslator>) -> Self {
        Self { engine, translator }
    }

    /// Translate a prompt to SQL and run it through the normal path.
    pub async fn db_query(&self, input: NlQueryInput) -> NlQueryOutput {
        let start = Instant::now();
        let prompt = input.prompt.trim();
        if prompt.is_empty() {
            return NlQueryOutput {
                generated_sql: None,
                result: BatchResult::failure(&DbError::invalid_input("prompt cannot be empty"), 0),
            };
        }

        let translated = match self.engine.schema().await {
            Ok(schema) => self.translator.generate_sql(prompt, &schema).await,
            Err(e) => Err(e),
        };

        let sql = match translated {
            Ok(sql) => sql,
            Err(e) => {
                warn!(error = %e, "Natural-language query could not be translated");
                return NlQueryOutput {
                    generated_sql: None,
                    result: BatchResult::failure(&e, start.elapsed().as_millis() as u64),
                };
            }
        };

        info!(sql_len = sql.len(), "Executing translated SQL");
        let result = self.engine.execute(&sql, None).await;
        NlQueryOutput {
            generated_sql: Some(sql),
            result,
        }
    }

    pub async fn execute_sql(&self, input: ExecuteSqlInput) -> BatchResult {
        self.engine.execute(&input.sql, input.params.as_ref()).await
    }

    pub fn validate_sql(&self, input: ValidateSqlInput) -> ValidationReport {
        self.engine.validate(&input.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_input_params_optional() {
        let input: ExecuteSqlInput = serde_json::from_str(r#"{"sql": "SELECT 1"}"#).unwrap();
        assert!(input.params.is_none());

        let input: ExecuteSqlInput =
            serde_json::from_str(r#"{"sql": "SELECT :a", "params": {"a": 1}}"#).unwrap();
        assert_eq!(input.params.unwrap().len(), 1);
    }

    #[test]
    fn test_nl_output_flattens_batch_result() {
        let output = NlQueryOutput {
            generated_sql: None,
            result: BatchResult::failure(&DbError::translation("model offline"), 3),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert!(json["generated_sql"].is_null());
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "translation_error");
    }
}
