//! Ollama translator.
//!
//! Calls the non-streaming `/api/generate` endpoint of a local Ollama server.

use crate::config::{DEFAULT_LLM_MODEL, DEFAULT_LLM_TIMEOUT_SECS, DEFAULT_LLM_URL};
use crate::error::{DbError, DbResult};
use crate::llm::{SYSTEM_PROMPT, SqlTranslator, build_prompt, extract_sql};
use crate::models::SchemaDescription;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Low temperature keeps the generated SQL close to deterministic.
const TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Model to use (e.g., "llama3.2:3b", "sqlcoder").
    pub model: String,
    pub timeout: Duration,
}

impl OllamaConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LLM_URL, DEFAULT_LLM_MODEL)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaTranslator {
    config: OllamaConfig,
    client: Client,
}

impl OllamaTranslator {
    pub fn new(config: OllamaConfig) -> DbResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DbError::translation(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %config.base_url, model = %config.model, "SQL translator configured");
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

#[async_trait]
impl SqlTranslator for OllamaTranslator {
    async fn generate_sql(&self, prompt: &str, schema: &SchemaDescription) -> DbResult<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: build_prompt(prompt, schema),
            system: SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
            },
        };

        debug!(model = %self.config.model, "Requesting SQL translation");

        let response = self
            .client
            .post(self.config.generate_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DbError::translation(format!(
                        "Model request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    DbError::translation(format!(
                        "Failed to connect to Ollama at {}. Is it running? Try: ollama serve",
                        self.config.base_url
                    ))
                } else {
                    DbError::translation(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DbError::translation(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(DbError::translation(format!(
                "Ollama API error ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| DbError::translation(format!("Failed to parse response: {}", e)))?;

        let sql = extract_sql(&parsed.response);
        if sql.is_empty() {
            return Err(DbError::translation("Model returned no SQL"));
        }

        debug!(sql_len = sql.len(), "Received SQL translation");
        Ok(sql)
    }
}
