//! Schema reflection and the reflected-schema cache.
//!
//! Reflection covers base tables of the connection's current schema: column
//! names in ordinal order, the native type name exactly as the database
//! reports it, nullability and primary-key membership.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each returning the same flat
//! [`Catalog`] which is then assembled into a [`SchemaDescription`].

use crate::db::pool::{DbPool, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDescription, DatabaseType, SchemaDescription, TableDescription};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Reads the live schema from a pool.
pub struct SchemaReflector;

impl SchemaReflector {
    /// Reflect the current schema.
    ///
    /// Fails with `Connection` if no connection can be acquired and with
    /// `Metadata` if an introspection query errors. A database without
    /// tables yields an empty description.
    pub async fn reflect(pool: &DbPool) -> DbResult<SchemaDescription> {
        let catalog = match pool {
            DbPool::Postgres(p) => postgres::read_catalog(p).await?,
            DbPool::MySql(p) => mysql::read_catalog(p).await?,
            DbPool::SQLite(p) => sqlite::read_catalog(p).await?,
        };

        let schema = catalog.assemble(pool.db_type());
        debug!(tables = schema.table_count(), "Reflected schema");
        Ok(schema)
    }
}

/// Flat reflection output shared by every backend.
#[derive(Debug, Default)]
struct Catalog {
    /// Table names
    tables: Vec<String>,
    /// (table, column) in ordinal order per table
    columns: Vec<(String, ColumnDescription)>,
    /// (table, column) in key order per table
    primary_keys: Vec<(String, String)>,
}

impl Catalog {
    fn assemble(self, database_type: DatabaseType) -> SchemaDescription {
        let mut schema = SchemaDescription::empty(database_type);
        for name in self.tables {
            schema.tables.insert(name, TableDescription::default());
        }

        for (table, column) in self.columns {
            if let Some(desc) = schema.tables.get_mut(&table) {
                desc.columns.push(column);
            }
        }

        for (table, column) in self.primary_keys {
            if let Some(desc) = schema.tables.get_mut(&table) {
                if let Some(col) = desc.columns.iter_mut().find(|c| c.name == column) {
                    col.primary_key = true;
                }
                desc.primary_key.push(column);
            }
        }

        schema
    }
}

fn acquire_error(db_type: DatabaseType, err: sqlx::Error) -> DbError {
    DbError::connection(
        format!("Failed to acquire connection for reflection: {}", err),
        connection_suggestion(db_type, &err),
    )
}

fn metadata_error(err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        conn @ DbError::Connection { .. } => conn,
        other => DbError::metadata(format!("Schema introspection failed: {}", other)),
    }
}

/// The last reflected schema, shared across requests.
///
/// Replaced only by an explicit refresh; writes to the database never
/// invalidate it.
#[derive(Debug, Default)]
pub struct SchemaCache {
    current: RwLock<Option<Arc<SchemaDescription>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot, if one has been loaded.
    pub async fn get(&self) -> Option<Arc<SchemaDescription>> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, schema: SchemaDescription) -> Arc<SchemaDescription> {
        let schema = Arc::new(schema);
        *self.current.write().await = Some(Arc::clone(&schema));
        schema
    }

    /// Reflect from `pool` and swap the result in.
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh(&self, pool: &DbPool) -> DbResult<Arc<SchemaDescription>> {
        let schema = SchemaReflector::reflect(pool).await?;
        info!(tables = schema.table_count(), "Schema cache refreshed");
        Ok(self.replace(schema).await)
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT c.relname::text AS table_name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema()
            AND c.relkind IN ('r', 'p')
            ORDER BY c.relname
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                c.relname::text AS table_name,
                a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS column_type,
                NOT a.attnotnull AS nullable
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema()
            AND c.relkind IN ('r', 'p')
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY c.relname, a.attnum
            "#;

        pub const LIST_PRIMARY_KEYS: &str = r#"
            SELECT
                c.relname::text AS table_name,
                a.attname::text AS column_name
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS k(attnum, ord) ON true
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            WHERE i.indisprimary
            AND n.nspname = current_schema()
            ORDER BY c.relname, k.ord
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME,
                CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8mb4) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;

        pub const LIST_PRIMARY_KEYS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8mb4) AS TABLE_NAME,
                CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT name, type, "notnull", pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn read_catalog(pool: &PgPool) -> DbResult<Catalog> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(DatabaseType::PostgreSQL, e))?;

        let tables = sqlx::query_scalar::<_, String>(queries::postgres::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?;

        let columns = sqlx::query(queries::postgres::LIST_COLUMNS)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?
            .iter()
            .map(|row| {
                let table: String = row.try_get("table_name")?;
                let name: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("column_type")?;
                let nullable: bool = row.try_get("nullable")?;
                Ok((table, ColumnDescription::new(name, data_type, nullable, false)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(metadata_error)?;

        let primary_keys: Vec<(String, String)> = sqlx::query(queries::postgres::LIST_PRIMARY_KEYS)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?
            .iter()
            .map(|row| Ok((row.try_get("table_name")?, row.try_get("column_name")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(metadata_error)?;

        Ok(Catalog {
            tables,
            columns,
            primary_keys,
        })
    }
}

mod mysql {
    use super::*;
    use sqlx::Row;
    use sqlx::mysql::{MySqlPool, MySqlRow};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> Result<String, sqlx::Error> {
        match row.try_get::<String, _>(column) {
            Ok(s) => Ok(s),
            Err(_) => row
                .try_get::<Vec<u8>, _>(column)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    pub async fn read_catalog(pool: &MySqlPool) -> DbResult<Catalog> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(DatabaseType::MySQL, e))?;

        let tables = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?
            .iter()
            .map(|row| get_string(row, "TABLE_NAME"))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(metadata_error)?;

        let columns = sqlx::query(queries::mysql::LIST_COLUMNS)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?
            .iter()
            .map(|row| {
                let table = get_string(row, "TABLE_NAME")?;
                let name = get_string(row, "COLUMN_NAME")?;
                let data_type = get_string(row, "COLUMN_TYPE")?;
                let nullable = get_string(row, "IS_NULLABLE")?.eq_ignore_ascii_case("YES");
                Ok((table, ColumnDescription::new(name, data_type, nullable, false)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(metadata_error)?;

        let primary_keys: Vec<(String, String)> = sqlx::query(queries::mysql::LIST_PRIMARY_KEYS)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?
            .iter()
            .map(|row| Ok((get_string(row, "TABLE_NAME")?, get_string(row, "COLUMN_NAME")?)))
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(metadata_error)?;

        Ok(Catalog {
            tables,
            columns,
            primary_keys,
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn read_catalog(pool: &SqlitePool) -> DbResult<Catalog> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(DatabaseType::SQLite, e))?;

        let tables = sqlx::query_scalar::<_, String>(queries::sqlite::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(metadata_error)?;

        let mut catalog = Catalog::default();
        for table in &tables {
            let rows = sqlx::query(queries::sqlite::TABLE_INFO)
                .bind(table.as_str())
                .fetch_all(&mut *conn)
                .await
                .map_err(metadata_error)?;

            // pk is the 1-based position within the key, 0 for non-key columns
            let mut key: Vec<(i64, String)> = Vec::new();
            for row in &rows {
                let name: String = row.try_get("name").map_err(metadata_error)?;
                let data_type: String = row.try_get("type").map_err(metadata_error)?;
                let notnull: i64 = row.try_get("notnull").map_err(metadata_error)?;
                let pk: i64 = row.try_get("pk").map_err(metadata_error)?;
                if pk > 0 {
                    key.push((pk, name.clone()));
                }
                catalog.columns.push((
                    table.clone(),
                    ColumnDescription::new(name, data_type, notnull == 0, false),
                ));
            }

            key.sort_by_key(|(pos, _)| *pos);
            catalog
                .primary_keys
                .extend(key.into_iter().map(|(_, name)| (table.clone(), name)));
        }

        catalog.tables = tables;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_marks_primary_keys_in_key_order() {
        let catalog = Catalog {
            tables: vec!["orders".into(), "empty".into()],
            columns: vec![
                ("orders".into(), ColumnDescription::new("id", "INTEGER", false, false)),
                ("orders".into(), ColumnDescription::new("line", "INTEGER", false, false)),
                ("orders".into(), ColumnDescription::new("note", "TEXT", true, false)),
                ("ghost".into(), ColumnDescription::new("x", "TEXT", true, false)),
            ],
            primary_keys: vec![
                ("orders".into(), "line".into()),
                ("orders".into(), "id".into()),
            ],
        };

        let schema = catalog.assemble(DatabaseType::SQLite);
        assert_eq!(schema.table_names(), vec!["empty", "orders"]);

        let orders = schema.table("orders").unwrap();
        assert_eq!(orders.primary_key, vec!["line", "id"]);
        assert!(orders.columns[0].primary_key);
        assert!(orders.columns[1].primary_key);
        assert!(!orders.columns[2].primary_key);

        assert!(schema.table("empty").unwrap().columns.is_empty());
        assert!(!schema.contains_table("ghost"));
    }

    #[test]
    fn test_metadata_error_keeps_connection_errors() {
        let err = metadata_error(sqlx::Error::PoolClosed);
        assert!(matches!(err, DbError::Connection { .. }));

        let err = metadata_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_cache_starts_empty_and_replaces() {
        let cache = SchemaCache::new();
        assert!(cache.get().await.is_none());

        cache
            .replace(SchemaDescription::empty(DatabaseType::MySQL))
            .await;
        let schema = cache.get().await.unwrap();
        assert_eq!(schema.database_type, DatabaseType::MySQL);
    }
}
