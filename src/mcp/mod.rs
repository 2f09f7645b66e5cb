//! MCP server integration module.
//!
//! Connects the query engine and translator to the MCP protocol using the
//! rmcp framework.

pub mod service;

pub use service::GatewayService;
