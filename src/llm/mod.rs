//! Natural-language to SQL translation.
//!
//! The translator is an untrusted collaborator: whatever it returns goes
//! through the same split, validate and execute path as caller-supplied SQL.

pub mod ollama;

use crate::error::DbResult;
use crate::models::SchemaDescription;
use async_trait::async_trait;

pub use ollama::{OllamaConfig, OllamaTranslator};

/// Turns a request in plain language into SQL for the given schema.
#[async_trait]
pub trait SqlTranslator: Send + Sync {
    async fn generate_sql(&self, prompt: &str, schema: &SchemaDescription) -> DbResult<String>;
}

/// Instructions sent with every translation request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that writes SQL queries for the \
database schema provided. Respond with a single valid SQL statement and nothing else: no \
explanations and no markdown formatting.";

/// Render the user-facing part of a translation request.
pub fn build_prompt(prompt: &str, schema: &SchemaDescription) -> String {
    let schema_json = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Database dialect: {}\n\nDatabase schema:\n{}\n\nUser request: {}\n\n\
         Respond with only the SQL query, no additional text or markdown formatting.",
        schema.database_type.dialect_name(),
        schema_json,
        prompt.trim()
    )
}

/// Pull the SQL out of a model reply.
///
/// Models often wrap their answer in a markdown fence despite being told not
/// to. The first fenced block wins when present; a trailing `;` is dropped.
pub fn extract_sql(reply: &str) -> String {
    let text = reply.trim();
    let body = match text.find("```") {
        Some(open) => {
            let after = &text[open + 3..];
            // Skip the info string (e.g. "sql") on the opening fence line
            let after = match after.find('\n') {
                Some(nl) if !after[..nl].trim().contains(' ') => &after[nl + 1..],
                _ => after,
            };
            match after.find("```") {
                Some(close) => &after[..close],
                None => after,
            }
        }
        None => text,
    };

    body.trim().trim_end_matches(';').trim_end().to_string()
}
