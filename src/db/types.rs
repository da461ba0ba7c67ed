//! Decoding driver rows into export [`Row`]s.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the driver's column type into a decode category
//! 2. Database-specific decoders extract the value for that category
//!
//! This is independent of [`crate::typemap`], which classifies catalog type
//! strings for the writers. Here we only need to know which Rust type to ask
//! the driver for.

use crate::models::{Row, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Decode category for a driver column type.
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
    Date,
    Time,
    DateTime,
    TimestampTz,
    Unknown,
}

/// Classify a driver type name into a decode category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Temporal types first: "interval" and "timestamp" must not fall into the int checks
    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        "datetime" | "timestamp" => return TypeCategory::DateTime,
        "timestamptz" => return TypeCategory::TimestampTz,
        "interval" | "point" | "timetz" => return TypeCategory::Unknown,
        _ => {}
    }

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "enum" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Raw wrappers
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
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
        PgTypeInfo::with_name("numeric")
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
            PgValueFormat::Binary => pg_numeric_text(value.as_bytes()?)
                .map(RawDecimal)
                .ok_or_else(|| "malformed NUMERIC value".into()),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as text.
fn pg_numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<i16> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
    };
    let ndigits = usize::try_from(word(0)?).ok()?;
    let weight = i32::from(word(1)?);
    let sign = word(2)? as u16;
    let dscale = usize::from(word(3)? as u16);

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits: Vec<i16> = (0..ndigits).map(|i| word(4 + i)).collect::<Option<_>>()?;
    let group = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

/// PostgreSQL UUID rendered in its canonical hyphenated form.
#[derive(Debug)]
pub struct RawUuid(pub String);

impl Type<sqlx::Postgres> for RawUuid {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("uuid")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("uuid")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawUuid {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let bytes = <&[u8] as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawUuid(format_uuid(bytes)))
    }
}

/// Bytes of any PostgreSQL value the exporter has no native mapping for
/// (enums, inet, intervals, ...).
#[derive(Debug)]
pub struct RawBytes(pub Vec<u8>);

impl Type<sqlx::Postgres> for RawBytes {
    fn type_info() -> PgTypeInfo {
        <Vec<u8> as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawBytes {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let bytes = <&[u8] as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawBytes(bytes.to_vec()))
    }
}

/// Binary UUID (16 bytes) to `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`; other
/// lengths are treated as text.
fn format_uuid(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Bytes that happen to be UTF-8 become text.
fn bytes_or_text(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

// =============================================================================
// Row decoding
// =============================================================================

/// Conversion of a driver row into an export [`Row`].
pub trait DecodeRow: sqlx::Row {
    /// Column names in select order.
    fn column_names(&self) -> Arc<[String]> {
        self.columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .into()
    }

    fn decode_values(&self) -> Vec<Value>;

    /// Decode the row, reusing already-shared column names when given.
    fn to_export_row(&self, columns: Option<&Arc<[String]>>) -> Row {
        let columns = match columns {
            Some(c) if c.len() == self.len() => Arc::clone(c),
            _ => self.column_names(),
        };
        Row::new(columns, self.decode_values())
    }
}

impl DecodeRow for MySqlRow {
    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                postgres::decode_column(self, idx, category)
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn decode_values(&self) -> Vec<Value> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                sqlite::decode_column(self, idx, category)
            })
            .collect()
    }
}

fn is_null<R: sqlx::Row>(row: &R, idx: usize) -> bool
where
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        if is_null(row, idx) {
            return Value::Null;
        }
        let value = match category {
            TypeCategory::Decimal => row.try_get::<RawDecimal, _>(idx).ok().map(|v| Value::Decimal(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            TypeCategory::Json => row.try_get::<serde_json::Value, _>(idx).ok().map(Value::Json),
            TypeCategory::Date => row.try_get::<NaiveDate, _>(idx).ok().map(Value::Date),
            TypeCategory::Time => row.try_get::<NaiveTime, _>(idx).ok().map(Value::Time),
            TypeCategory::DateTime | TypeCategory::TimestampTz => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .map(Value::DateTime),
            _ => None,
        };
        value.unwrap_or_else(|| decode_text(row, idx))
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(Value::Int(v));
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        row.try_get::<u64, _>(idx).ok().map(Value::UInt)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(Value::Float(v));
        }
        row.try_get::<f32, _>(idx).ok().map(|v| Value::Float(v.into()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Value::Text(v);
        }
        match row.try_get::<Vec<u8>, _>(idx) {
            Ok(v) => bytes_or_text(v),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode MySQL column");
                Value::Null
            }
        }
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        if is_null(row, idx) {
            return Value::Null;
        }
        let value = match category {
            TypeCategory::Decimal => row.try_get::<RawDecimal, _>(idx).ok().map(|v| Value::Decimal(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            TypeCategory::Json => row.try_get::<serde_json::Value, _>(idx).ok().map(Value::Json),
            TypeCategory::Uuid => row.try_get::<RawUuid, _>(idx).ok().map(|v| Value::Text(v.0)),
            TypeCategory::Date => row.try_get::<NaiveDate, _>(idx).ok().map(Value::Date),
            TypeCategory::Time => row.try_get::<NaiveTime, _>(idx).ok().map(Value::Time),
            TypeCategory::DateTime => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .map(Value::DateTime),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .ok()
                .map(Value::Timestamp),
            TypeCategory::Text => row.try_get::<String, _>(idx).ok().map(Value::Text),
            TypeCategory::Unknown => None,
        };
        value.unwrap_or_else(|| decode_raw(row, idx))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        row.try_get::<i64, _>(idx).ok().map(Value::Int)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(Value::Float(v));
        }
        row.try_get::<f32, _>(idx).ok().map(|v| Value::Float(v.into()))
    }

    fn decode_raw(row: &PgRow, idx: usize) -> Value {
        match row.try_get::<RawBytes, _>(idx) {
            Ok(v) => bytes_or_text(v.0),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode PostgreSQL column");
                Value::Null
            }
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        if is_null(row, idx) {
            return Value::Null;
        }
        // SQLite is dynamically typed: the declared type is only a hint
        let value = match category {
            TypeCategory::Integer => row.try_get::<i64, _>(idx).ok().map(Value::Int),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
            TypeCategory::Float | TypeCategory::Decimal => {
                row.try_get::<f64, _>(idx).ok().map(Value::Float)
            }
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes),
            _ => None,
        };
        value.unwrap_or_else(|| decode_dynamic(row, idx))
    }

    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
            return Value::Text(v);
        }
        if let Ok(v) = row.try_get_unchecked::<i64, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(v) = row.try_get_unchecked::<f64, _>(idx) {
            return Value::Float(v);
        }
        match row.try_get_unchecked::<Vec<u8>, _>(idx) {
            Ok(v) => bytes_or_text(v),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode SQLite column");
                Value::Null
            }
        }
    }
}
