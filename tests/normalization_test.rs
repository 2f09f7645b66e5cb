//! Integration tests for row normalization.
//!
//! Every value comes back as a JSON scalar: NULL as null, temporal values as
//! ISO-8601 strings, binary values as text.

use db_query_gateway::config::PoolOptions;
use db_query_gateway::db::{DbPool, EngineSettings, QueryEngine};
use db_query_gateway::models::ConnectionConfig;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

async fn setup_engine(ddl: &[&str]) -> QueryEngine {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let config =
        ConnectionConfig::new(format!("sqlite:{}", db_path), PoolOptions::default()).unwrap();
    let pool = DbPool::connect(&config).await.unwrap();
    if let DbPool::SQLite(p) = &pool {
        for statement in ddl {
            sqlx::query(statement).execute(p).await.unwrap();
        }
    }
    QueryEngine::new(pool, EngineSettings::default())
}

async fn single_row(engine: &QueryEngine, sql: &str) -> serde_json::Map<String, Value> {
    let result = engine.execute(sql, None).await;
    assert!(result.is_success(), "{}: {}", sql, result.message);
    result.first_rows().unwrap()[0].clone()
}

#[tokio::test]
async fn test_null_becomes_json_null() {
    let engine = setup_engine(&["CREATE TABLE t (id INTEGER PRIMARY KEY, note TEXT, score REAL)"]).await;
    engine
        .execute("INSERT INTO t (id, note, score) VALUES (1, NULL, NULL)", None)
        .await;

    let row = single_row(&engine, "SELECT note, score FROM t WHERE id = 1").await;
    assert_eq!(row["note"], Value::Null);
    assert_eq!(row["score"], Value::Null);
}

#[tokio::test]
async fn test_scalars_keep_their_json_kind() {
    let engine = setup_engine(&[
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, ratio REAL, active BOOLEAN)",
    ])
    .await;
    engine
        .execute("INSERT INTO t VALUES (7, 'seven', 0.5, 1)", None)
        .await;

    let row = single_row(&engine, "SELECT id, name, ratio, active FROM t").await;
    assert_eq!(row["id"], json!(7));
    assert_eq!(row["name"], json!("seven"));
    assert_eq!(row["ratio"], json!(0.5));
    assert_eq!(row["active"], json!(true));
}

#[tokio::test]
async fn test_temporal_values_are_iso_strings() {
    let engine = setup_engine(&[
        "CREATE TABLE events (id INTEGER PRIMARY KEY, happened_at DATETIME, day DATE)",
    ])
    .await;
    engine
        .execute(
            "INSERT INTO events VALUES (1, '2024-01-15 10:30:00', '2024-01-15')",
            None,
        )
        .await;

    let row = single_row(&engine, "SELECT happened_at, day FROM events").await;
    let happened_at = row["happened_at"].as_str().unwrap();
    assert!(happened_at.starts_with("2024-01-15"));
    assert!(happened_at.contains("10:30:00"));
    assert_eq!(row["day"], json!("2024-01-15"));
}

#[tokio::test]
async fn test_binary_values_decode_as_text() {
    let engine = setup_engine(&["CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB)"]).await;
    engine
        .execute(
            "INSERT INTO files VALUES (1, X'68656C6C6F'), (2, X'61FF62')",
            None,
        )
        .await;

    let result = engine
        .execute("SELECT data FROM files ORDER BY id", None)
        .await;
    let rows = result.first_rows().unwrap();
    assert_eq!(rows[0]["data"], json!("hello"));
    // Invalid UTF-8 is replaced rather than failing the row
    assert_eq!(rows[1]["data"], json!("a\u{FFFD}b"));
}

#[tokio::test]
async fn test_columns_preserve_select_order() {
    let engine = setup_engine(&["CREATE TABLE t (a INTEGER, b INTEGER, c INTEGER)"]).await;
    engine.execute("INSERT INTO t VALUES (1, 2, 3)", None).await;

    let result = engine.execute("SELECT c, a, b FROM t", None).await;
    let row = &result.first_rows().unwrap()[0];
    let keys: Vec<&str> = row.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_utf8_text_round_trips() {
    let engine = setup_engine(&["CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)"]).await;
    engine
        .execute("INSERT INTO t VALUES (1, 'Zürich café 東京')", None)
        .await;

    let row = single_row(&engine, "SELECT label FROM t").await;
    assert_eq!(row["label"], json!("Zürich café 東京"));
}
