//! Schema description models produced by reflection.

use crate::models::DatabaseType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDescription {
    pub name: String,
    /// Native type name as declared in the database, not normalized across dialects
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDescription {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        primary_key: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            primary_key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableDescription {
    /// Columns in ordinal order
    pub columns: Vec<ColumnDescription>,
    /// Primary key column names in key order
    pub primary_key: Vec<String>,
}

/// A point-in-time snapshot of the database schema.
///
/// Tables are keyed and ordered by name. A database with no tables yields an
/// empty map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaDescription {
    pub tables: BTreeMap<String, TableDescription>,
    pub database_type: DatabaseType,
}

impl SchemaDescription {
    pub fn empty(database_type: DatabaseType) -> Self {
        Self {
            tables: BTreeMap::new(),
            database_type,
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<&TableDescription> {
        self.tables.get(name)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_serialization_shape() {
        let mut schema = SchemaDescription::empty(DatabaseType::SQLite);
        schema.tables.insert(
            "users".into(),
            TableDescription {
                columns: vec![
                    ColumnDescription::new("id", "INTEGER", false, true),
                    ColumnDescription::new("name", "TEXT", true, false),
                ],
                primary_key: vec!["id".into()],
            },
        );

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["database_type"], "sqlite");
        assert_eq!(json["tables"]["users"]["columns"][0]["type"], "INTEGER");
        assert_eq!(json["tables"]["users"]["columns"][1]["nullable"], true);
        assert_eq!(json["tables"]["users"]["primary_key"][0], "id");
        assert!(schema.contains_table("users"));
        assert!(!schema.contains_table("Users"));
    }

    #[test]
    fn test_empty_schema() {
        let schema = SchemaDescription::empty(DatabaseType::PostgreSQL);
        assert_eq!(schema.table_count(), 0);
        assert!(schema.table_names().is_empty());
    }
}
