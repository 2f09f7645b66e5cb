//! JSON bodies of the MCP resources.

use crate::error::DbResult;
use crate::models::SchemaDescription;
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

pub const SCHEMA_URI: &str = "db://schema";
pub const TABLES_URI: &str = "db://tables";

pub fn schema_resource(schema: DbResult<Arc<SchemaDescription>>) -> JsonValue {
    match schema {
        Ok(schema) => json!({
            "status": "success",
            "schema": schema.as_ref(),
            "timestamp": Utc::now().to_rfc3339(),
        }),
        Err(e) => json!({
            "status": "error",
            "message": e.to_string(),
            "schema": {},
        }),
    }
}

pub fn tables_resource(tables: DbResult<Vec<String>>) -> JsonValue {
    match tables {
        Ok(tables) => json!({ "status": "success", "tables": tables }),
        Err(e) => json!({
            "status": "error",
            "message": e.to_string(),
            "tables": [],
        }),
    }
}
