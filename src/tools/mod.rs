//! MCP tool implementations.
//!
//! - `query`: db_query, execute_sql, validate_sql
//! - `schema`: get_schema, refresh_schema, list_tables, sample_data, test_connection
//! - `prompts`: canned guidance prompts
//! - `resources`: bodies of the `db://` resources

pub mod prompts;
pub mod query;
pub mod resources;
pub mod schema;

pub use query::{ExecuteSqlInput, NlQueryInput, NlQueryOutput, QueryToolHandler, ValidateSqlInput};
pub use schema::{ListTablesOutput, SampleDataInput, SchemaToolHandler};
