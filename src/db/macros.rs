//! Database dispatch macros.
//!
//! Expands one expression per `DbPool` variant so backend-specific calls read
//! as a single match.

/// Generate a match over `DbPool` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => sqlx::query("SELECT 1").execute(p).await,
///     Postgres(p) => sqlx::query("SELECT 1").execute(p).await,
///     SQLite(p) => sqlx::query("SELECT 1").execute(p).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}
