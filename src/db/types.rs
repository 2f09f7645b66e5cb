//! Row normalization.
//!
//! Driver rows are converted into [`Record`]s of JSON scalars:
//!
//! | store value            | record value                      |
//! |------------------------|-----------------------------------|
//! | NULL                   | `null`                            |
//! | boolean                | `true` / `false`                  |
//! | integer                | number                            |
//! | float                  | number (non-finite as text)       |
//! | DECIMAL / NUMERIC      | exact decimal text                |
//! | date / time / datetime | ISO-8601 text                     |
//! | binary                 | UTF-8 text, lossily decoded       |
//! | JSON                   | the JSON value                    |
//! | anything else          | text                              |
//!
//! Type conversion uses a two-phase approach: `TypeCategory` classifies the
//! declared column type, then a backend-specific decoder extracts the value.
//! A value that does not decode as its category falls back to text, then
//! bytes, before giving up.
//!
//! Columns are inserted in order, so when a result has two columns with the
//! same name the later value wins while the key keeps its first position.

use crate::models::{DatabaseType, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::{debug, warn};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower.split_whitespace().next().unwrap_or_default();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if base.contains("decimal") || base.contains("numeric") {
        // SQLite's NUMERIC is type affinity, not exact decimal storage
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if base.starts_with("timestamp")
        || base.starts_with("datetime")
        || base == "date"
        || base == "time"
        || base == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if base == "interval" || base == "point" {
        return TypeCategory::Text;
    }

    if base.starts_with("int")
        || base.ends_with("int")
        || base.contains("serial")
        || base == "year"
    {
        return TypeCategory::Integer;
    }

    if base == "bool" || base == "boolean" {
        return TypeCategory::Boolean;
    }

    if base.contains("float") || base.contains("double") || base == "real" {
        return TypeCategory::Float;
    }

    if base == "json" || base == "jsonb" {
        return TypeCategory::Json;
    }

    if base == "uuid" {
        return TypeCategory::Uuid;
    }

    if base.contains("blob") || base.contains("binary") || base == "bytea" {
        return TypeCategory::Binary;
    }

    if base.contains("char") || base.contains("text") || base == "name" || base == "enum" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Exact DECIMAL/NUMERIC value as text.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => pg_numeric_to_string(value.as_bytes()?)
                .map(RawDecimal)
                .ok_or_else(|| "malformed NUMERIC value".into()),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as text.
fn pg_numeric_to_string(bytes: &[u8]) -> Option<String> {
    const SIGN_NEG: u16 = 0x4000;
    const SIGN_NAN: u16 = 0xC000;
    const SIGN_PINF: u16 = 0xD000;
    const SIGN_NINF: u16 = 0xF000;

    let word = |i: usize| -> Option<[u8; 2]> { bytes.get(i * 2..i * 2 + 2)?.try_into().ok() };
    let ndigits = i16::from_be_bytes(word(0)?) as usize;
    let weight = i16::from_be_bytes(word(1)?) as i32;
    let sign = u16::from_be_bytes(word(2)?);
    let dscale = u16::from_be_bytes(word(3)?) as usize;

    match sign {
        SIGN_NAN => return Some("NaN".to_string()),
        SIGN_PINF => return Some("Infinity".to_string()),
        SIGN_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits: Vec<i16> = (0..ndigits)
        .map(|i| word(4 + i).map(i16::from_be_bytes))
        .collect::<Option<_>>()?;
    let digit_at = |idx: i32| -> i16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == SIGN_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit_at(0).to_string());
        for idx in 1..=weight {
            out.push_str(&format!("{:04}", digit_at(idx)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let groups = dscale.div_ceil(4) as i32;
        for k in 0..groups {
            fraction.push_str(&format!("{:04}", digit_at(weight + 1 + k)));
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

// =============================================================================
// Scalar helpers
// =============================================================================

/// Decode binary data as UTF-8 text, replacing invalid sequences.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => {
            debug!(len = bytes.len(), "Binary value is not valid UTF-8, decoding lossily");
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn text_to_json(text: String, type_name: &str) -> JsonValue {
    if type_name.to_lowercase().contains("json") {
        if let Ok(json) = serde_json::from_str::<JsonValue>(&text) {
            return json;
        }
    }
    JsonValue::String(text)
}

fn datetime_to_json(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format(DATETIME_FORMAT).to_string())
}

fn datetime_utc_to_json(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

/// Try decoders in order; the first that succeeds wins.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $( $ty:ty => $conv:expr ),+ $(,)?) => {{
        let mut value = None;
        $(
            if value.is_none() {
                if let Ok(v) = $row.try_get::<$ty, _>($idx) {
                    value = Some(($conv)(v));
                }
            }
        )+
        value
    }};
}

/// Last-resort decoding for values whose category decoder failed.
macro_rules! decode_fallback {
    ($row:expr, $idx:expr, $type_name:expr) => {
        first_decoded!($row, $idx,
            String => JsonValue::String,
            Vec<u8> => |v: Vec<u8>| binary_to_json(&v),
            i64 => |v: i64| JsonValue::Number(v.into()),
            f64 => float_to_json,
            bool => JsonValue::Bool,
        )
        .unwrap_or_else(|| {
            warn!(column = $idx, type_name = %$type_name, "Unsupported column type, returning null");
            JsonValue::Null
        })
    };
}

// =============================================================================
// Row to Record Trait
// =============================================================================

/// Conversion of a driver row into a normalized record.
pub trait RowToRecord {
    fn to_record(&self) -> Record;

    /// Column names in result order, without duplicates.
    fn column_names(&self) -> Vec<String>;
}

fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

impl RowToRecord for MySqlRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            record.insert(col.name().to_string(), mysql::decode_column(self, idx, type_name, category));
        }
        record
    }

    fn column_names(&self) -> Vec<String> {
        unique_names(self.columns().iter().map(|c| c.name()))
    }
}

impl RowToRecord for PgRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            record.insert(
                col.name().to_string(),
                postgres::decode_column(self, idx, type_name, category),
            );
        }
        record
    }

    fn column_names(&self) -> Vec<String> {
        unique_names(self.columns().iter().map(|c| c.name()))
    }
}

impl RowToRecord for SqliteRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::SQLite);
            record.insert(col.name().to_string(), sqlite::decode_column(self, idx, type_name, category));
        }
        record
    }

    fn column_names(&self) -> Vec<String> {
        unique_names(self.columns().iter().map(|c| c.name()))
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return JsonValue::Null;
        }

        let value = match category {
            TypeCategory::Decimal => first_decoded!(row, idx, RawDecimal => |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => |v: i64| JsonValue::Number(v.into()),
                u64 => |v: u64| JsonValue::Number(v.into()),
                i32 => |v: i32| JsonValue::Number(v.into()),
                u32 => |v: u32| JsonValue::Number(v.into()),
                i16 => |v: i16| JsonValue::Number(v.into()),
                u16 => |v: u16| JsonValue::Number(v.into()),
                i8 => |v: i8| JsonValue::Number(v.into()),
                u8 => |v: u8| JsonValue::Number(v.into()),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => JsonValue::Bool),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => float_to_json,
                f32 => |v: f32| float_to_json(v as f64),
            ),
            TypeCategory::Temporal => first_decoded!(row, idx,
                NaiveDateTime => datetime_to_json,
                DateTime<Utc> => datetime_utc_to_json,
                NaiveDate => |v: NaiveDate| JsonValue::String(v.to_string()),
                NaiveTime => |v: NaiveTime| JsonValue::String(v.to_string()),
            ),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| binary_to_json(&v)),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => |v: JsonValue| v),
            _ => first_decoded!(row, idx, String => |v: String| text_to_json(v, type_name)),
        };

        value.unwrap_or_else(|| decode_fallback!(row, idx, type_name))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return JsonValue::Null;
        }

        let value = match category {
            TypeCategory::Decimal => first_decoded!(row, idx, RawDecimal => |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => |v: i64| JsonValue::Number(v.into()),
                i32 => |v: i32| JsonValue::Number(v.into()),
                i16 => |v: i16| JsonValue::Number(v.into()),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => JsonValue::Bool),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => float_to_json,
                f32 => |v: f32| float_to_json(v as f64),
            ),
            TypeCategory::Temporal => first_decoded!(row, idx,
                NaiveDateTime => datetime_to_json,
                DateTime<Utc> => datetime_utc_to_json,
                NaiveDate => |v: NaiveDate| JsonValue::String(v.to_string()),
                NaiveTime => |v: NaiveTime| JsonValue::String(v.to_string()),
            ),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| binary_to_json(&v)),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => |v: JsonValue| v),
            TypeCategory::Uuid => first_decoded!(row, idx, uuid::Uuid => |v: uuid::Uuid| JsonValue::String(v.to_string())),
            _ => first_decoded!(row, idx, String => |v: String| text_to_json(v, type_name)),
        };

        value.unwrap_or_else(|| decode_fallback!(row, idx, type_name))
    }
}

/// SQLite stores values by affinity, so a column declared INTEGER may hold
/// text. Only boolean and temporal declarations steer decoding; everything
/// else follows the storage class of the value itself.
mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        let storage_class = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return JsonValue::Null,
        };

        let value = match (category, storage_class.as_str()) {
            (TypeCategory::Boolean, "INTEGER" | "BIGINT") => first_decoded!(row, idx, bool => JsonValue::Bool),
            (TypeCategory::Temporal, "TEXT" | "INTEGER" | "BIGINT" | "REAL") => first_decoded!(row, idx,
                NaiveDateTime => datetime_to_json,
                NaiveDate => |v: NaiveDate| JsonValue::String(v.to_string()),
                NaiveTime => |v: NaiveTime| JsonValue::String(v.to_string()),
                String => JsonValue::String,
            ),
            (_, "INTEGER" | "BIGINT") => first_decoded!(row, idx, i64 => |v: i64| JsonValue::Number(v.into())),
            (_, "REAL") => first_decoded!(row, idx, f64 => float_to_json),
            (_, "BLOB") => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| binary_to_json(&v)),
            _ => first_decoded!(row, idx, String => |v: String| text_to_json(v, type_name)),
        };

        value.unwrap_or_else(|| decode_fallback!(row, idx, type_name))
    }
}
