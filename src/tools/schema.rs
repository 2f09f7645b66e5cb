//! Schema and introspection tools.

use crate::db::QueryEngine;
use crate::error::DbResult;
use crate::models::{BatchResult, ConnectionStatus, SchemaDescription};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Table names, sorted
    pub tables: Vec<String>,
    pub count: usize,
}

/// Input for the sample_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SampleDataInput {
    /// Exact table name as reported by list_tables
    pub table_name: String,
    /// Number of rows to return. Default: 5
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Handler for schema-related tools.
pub struct SchemaToolHandler {
    engine: Arc<QueryEngine>,
}

impl SchemaToolHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    pub async fn get_schema(&self) -> DbResult<SchemaDescription> {
        Ok(self.engine.schema().await?.as_ref().clone())
    }

    pub async fn refresh_schema(&self) -> DbResult<SchemaDescription> {
        Ok(self.engine.refresh_schema().await?.as_ref().clone())
    }

    pub async fn list_tables(&self) -> DbResult<ListTablesOutput> {
        let tables = self.engine.list_tables().await?;
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    pub async fn sample_data(&self, input: SampleDataInput) -> DbResult<BatchResult> {
        self.engine
            .sample_data(input.table_name.trim(), input.limit)
            .await
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        self.engine.test_connection().await
    }
}
