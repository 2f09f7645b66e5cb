//! SQL text handling: tokenizing, splitting, policy checks and rewriting.
//!
//! Nothing in this module touches a database connection.

pub mod lexer;
pub mod params;
pub mod shape;
pub mod splitter;
pub mod validator;

pub use params::{BoundStatement, bind_named};
pub use shape::{StatementShape, apply_row_cap};
pub use splitter::{StatementBatch, split};
pub use validator::{Rule, SafetyValidator, ValidationVerdict};
