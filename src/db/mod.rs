//! Database access layer.
//!
//! - Connection pool management
//! - Schema reflection and the schema cache
//! - Transactional batch execution
//! - Row normalization
//! - The `QueryEngine` facade tying them together

#[macro_use]
pub mod macros;
pub mod engine;
pub mod executor;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use engine::{EngineSettings, QueryEngine};
pub use executor::{ExecutionLimits, PreparedStatement, TransactionalExecutor};
pub use pool::DbPool;
pub use schema::{SchemaCache, SchemaReflector};
pub use types::RowToRecord;
