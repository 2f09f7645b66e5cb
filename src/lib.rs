//! DB Query Gateway Library
//!
//! Natural-language and raw SQL access to a single relational database
//! (SQLite, PostgreSQL, MySQL) behind a safety policy, exposed over MCP.

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod sql;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::GatewayService;
