//! Canned guidance served as MCP prompts.

use crate::models::SchemaDescription;
use std::fmt::Write;

pub const SAMPLE_QUERIES: &str = "sample-queries";
pub const SCHEMA_HELP: &str = "schema-help";
pub const QUERY_TIPS: &str = "query-tips";

/// Name and description of every prompt, in listing order.
pub const PROMPTS: &[(&str, &str)] = &[
    (SAMPLE_QUERIES, "Example natural-language requests for db_query"),
    (SCHEMA_HELP, "Tables and columns of the connected database"),
    (QUERY_TIPS, "Tips for writing effective and safe queries"),
];

pub fn sample_queries() -> String {
    "Here are some requests you can try with db_query:\n\
     \n\
     - Show all users who registered in the last 7 days\n\
     - List all orders with status 'pending'\n\
     - Get the average salary per department\n\
     - Insert a new product named 'Widget 2.0' priced at 49\n\
     - Delete all logs older than 30 days\n\
     - Find customers who have not placed an order in the last 30 days\n\
     - Show the top 10 products by sales volume\n\
     - Get monthly revenue totals for the current year\n\
     - Find duplicate email addresses in the users table"
        .to_string()
}

/// Describe `schema` as plain text, one block per table.
pub fn schema_help(schema: &SchemaDescription) -> String {
    if schema.tables.is_empty() {
        return format!(
            "The {} database has no tables. Call refresh_schema after creating some.",
            schema.database_type.display_name()
        );
    }

    let mut out = format!(
        "Database: {}\nAvailable tables: {}\n",
        schema.database_type.display_name(),
        schema.table_names().join(", ")
    );

    for (name, table) in &schema.tables {
        let _ = writeln!(out, "\n{}:", name);
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.primary_key {
                flags.push("primary key");
            }
            if !column.nullable {
                flags.push("not null");
            }
            if flags.is_empty() {
                let _ = writeln!(out, "  - {} {}", column.name, column.data_type);
            } else {
                let _ = writeln!(
                    out,
                    "  - {} {} ({})",
                    column.name,
                    column.data_type,
                    flags.join(", ")
                );
            }
        }
    }
    out
}

pub fn query_tips() -> String {
    "Tips for effective queries:\n\
     \n\
     Query structure:\n\
     - Name the columns you need instead of SELECT *\n\
     - Filter with WHERE to keep result sets small\n\
     - Results are capped; add LIMIT and ORDER BY to control which rows you get\n\
     \n\
     Aggregation:\n\
     - Use GROUP BY with COUNT, SUM or AVG\n\
     - HAVING filters groups, WHERE filters rows\n\
     \n\
     Safety:\n\
     - Only SELECT, INSERT, UPDATE and DELETE are accepted\n\
     - Comments, stacked DDL and UNION SELECT are rejected\n\
     - Pass values as :name parameters with execute_sql instead of inlining them\n\
     - Statements sent together run in one transaction; one failure undoes them all\n\
     - Use validate_sql to check a statement without running it"
        .to_string()
}

/// Render a prompt by name.
pub fn render(name: &str, schema: Option<&SchemaDescription>) -> Option<String> {
    match name {
        SAMPLE_QUERIES => Some(sample_queries()),
        SCHEMA_HELP => Some(match schema {
            Some(schema) => schema_help(schema),
            None => "Schema is not available yet. Call refresh_schema.".to_string(),
        }),
        QUERY_TIPS => Some(query_tips()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescription, DatabaseType, TableDescription};

    #[test]
    fn test_schema_help_lists_columns_with_flags() {
        let mut schema = SchemaDescription::empty(DatabaseType::SQLite);
        schema.tables.insert(
            "users".into(),
            TableDescription {
                columns: vec![
                    ColumnDescription::new("id", "INTEGER", false, true),
                    ColumnDescription::new("email", "TEXT", true, false),
                ],
                primary_key: vec!["id".into()],
            },
        );

        let text = schema_help(&schema);
        assert!(text.contains("Available tables: users"));
        assert!(text.contains("  - id INTEGER (primary key, not null)"));
        assert!(text.contains("  - email TEXT\n"));
    }

    #[test]
    fn test_schema_help_empty_database() {
        let schema = SchemaDescription::empty(DatabaseType::MySQL);
        assert!(schema_help(&schema).contains("no tables"));
    }

    #[test]
    fn test_render_unknown_prompt() {
        assert!(render("nope", None).is_none());
        assert!(render(QUERY_TIPS, None).unwrap().contains("validate_sql"));
        assert!(render(SCHEMA_HELP, None).unwrap().contains("refresh_schema"));
    }
}
