//! MCP service implementation using rmcp.
//!
//! `GatewayService` exposes the query engine as MCP tools, the cached schema
//! as resources and usage guidance as prompts.

use crate::db::QueryEngine;
use crate::llm::SqlTranslator;
use crate::models::{BatchResult, ConnectionStatus, SchemaDescription, ValidationReport};
use crate::tools::prompts;
use crate::tools::query::{
    ExecuteSqlInput, NlQueryInput, NlQueryOutput, QueryToolHandler, ValidateSqlInput,
};
use crate::tools::resources::{self, SCHEMA_URI, TABLES_URI};
use crate::tools::schema::{ListTablesOutput, SampleDataInput, SchemaToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        GetPromptRequestParam, GetPromptResult, Implementation, ListPromptsResult,
        ListResourcesResult, PaginatedRequestParam, Prompt, PromptMessage, PromptMessageRole,
        ProtocolVersion, RawResource, ReadResourceRequestParam, ReadResourceResult, Resource,
        ResourceContents, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct GatewayService {
    engine: Arc<QueryEngine>,
    translator: Arc<dyn SqlTranslator>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    pub fn new(engine: Arc<QueryEngine>, translator: Arc<dyn SqlTranslator>) -> Self {
        Self {
            engine,
            translator,
            tool_router: Self::tool_router(),
        }
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    fn query_handler(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.engine.clone(), self.translator.clone())
    }

    fn schema_handler(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.engine.clone())
    }

    fn resource(uri: &str, name: &str, description: &str) -> Resource {
        let mut raw = RawResource::new(uri, name.to_string());
        raw.description = Some(description.to_string());
        raw.mime_type = Some("application/json".to_string());
        Resource::new(raw, None)
    }
}

/// Race `work` against cancellation of the request.
///
/// Dropping the work future drops any open transaction, which sqlx rolls
/// back before returning the connection to the pool.
async fn cancellable<T>(
    context: &RequestContext<RoleServer>,
    tool: &'static str,
    work: impl Future<Output = T>,
) -> Result<T, McpError> {
    tokio::select! {
        result = work => Ok(result),
        _ = context.ct.cancelled() => {
            warn!(tool, "Request cancelled; in-flight work abandoned");
            Err(McpError::internal_error(format!("{} was cancelled", tool), None))
        }
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Answer a question or make a change described in plain language.\nThe request is translated to SQL by a language model, checked against the safety policy and executed in one transaction.\nReturns the generated SQL and per-statement results."
    )]
    async fn db_query(
        &self,
        Parameters(input): Parameters<NlQueryInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<NlQueryOutput>, McpError> {
        let handler = self.query_handler();
        cancellable(&context, "db_query", handler.db_query(input))
            .await
            .map(Json)
    }

    #[tool(
        description = "Execute SQL directly. Several statements separated by `;` run in a single transaction: all commit or none do.\nOnly SELECT, INSERT, UPDATE and DELETE are accepted.\nUse `:name` placeholders with `params` (single statement only).\nSELECT results are capped at the configured row limit."
    )]
    async fn execute_sql(
        &self,
        Parameters(input): Parameters<ExecuteSqlInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<BatchResult>, McpError> {
        let handler = self.query_handler();
        cancellable(&context, "execute_sql", handler.execute_sql(input))
            .await
            .map(Json)
    }

    #[tool(
        description = "Check SQL against the safety policy without executing it.\nReturns is_valid plus a verdict per statement."
    )]
    async fn validate_sql(
        &self,
        Parameters(input): Parameters<ValidateSqlInput>,
    ) -> Json<ValidationReport> {
        Json(self.query_handler().validate_sql(input))
    }

    #[tool(
        description = "Get the database schema: tables, columns with native types, nullability and primary keys.\nServed from the cache; call refresh_schema after DDL changes."
    )]
    async fn get_schema(&self) -> Result<Json<SchemaDescription>, McpError> {
        self.schema_handler()
            .get_schema()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Re-read the database schema and replace the cached copy.")]
    async fn refresh_schema(&self) -> Result<Json<SchemaDescription>, McpError> {
        self.schema_handler()
            .refresh_schema()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List table names from the cached schema.")]
    async fn list_tables(&self) -> Result<Json<ListTablesOutput>, McpError> {
        self.schema_handler()
            .list_tables()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Return the first rows of a table (default 5).\nThe table must appear in list_tables."
    )]
    async fn sample_data(
        &self,
        Parameters(input): Parameters<SampleDataInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<Json<BatchResult>, McpError> {
        let handler = self.schema_handler();
        cancellable(&context, "sample_data", handler.sample_data(input))
            .await?
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Check that the database answers. Reports dialect, server version and table count."
    )]
    async fn test_connection(&self) -> Json<ConnectionStatus> {
        Json(self.schema_handler().test_connection().await)
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "db-query-gateway".to_owned(),
                title: Some("DB Query Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Query a {} database in plain language or SQL.\n\
                \n\
                ## Workflow\n\
                1. Call `list_tables` or `get_schema` to see what exists\n\
                2. Ask with `db_query` (natural language) or run SQL with `execute_sql`\n\
                3. Use `validate_sql` to check a statement without running it\n\
                \n\
                ## Rules\n\
                - Only SELECT, INSERT, UPDATE and DELETE are accepted; comments are rejected\n\
                - Statements in one call run in one transaction and roll back together\n\
                - Use `:name` placeholders with `params` for values\n\
                - Results are capped at {} rows per statement",
                self.engine.dialect().display_name(),
                self.engine.settings().max_rows
            )),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(vec![
            Self::resource(SCHEMA_URI, "schema", "Cached database schema"),
            Self::resource(TABLES_URI, "tables", "Table names from the cached schema"),
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri;
        let body = match uri.as_str() {
            SCHEMA_URI => resources::schema_resource(self.engine.schema().await),
            TABLES_URI => resources::tables_resource(self.engine.list_tables().await),
            _ => {
                return Err(McpError::resource_not_found(
                    format!("Unknown resource: {}", uri),
                    Some(serde_json::json!({ "uri": uri })),
                ));
            }
        };

        let text = serde_json::to_string_pretty(&body)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts = prompts::PROMPTS
            .iter()
            .map(|(name, description)| Prompt::new(*name, Some(*description), None))
            .collect();
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let name = request.name;
        let schema = if name == prompts::SCHEMA_HELP {
            self.engine.schema().await.ok()
        } else {
            None
        };

        let text = prompts::render(&name, schema.as_deref()).ok_or_else(|| {
            McpError::invalid_params(format!("Unknown prompt: {}", name), None)
        })?;
        info!(prompt = %name, "Serving prompt");

        Ok(GetPromptResult {
            description: prompts::PROMPTS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, d)| d.to_string()),
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}
