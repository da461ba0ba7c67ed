//! SQL literal rendering per target dialect.

use crate::export::ddl::ColumnKind;
use crate::models::{Dialect, Value};
use std::fmt::Write;

/// Render `value` as a literal for an `INSERT` into a `kind` column.
///
/// With no column kind the value is rendered by its own type.
pub fn render_value(value: &Value, kind: Option<ColumnKind>, target: Dialect) -> String {
    let boolean_column = kind == Some(ColumnKind::Boolean);
    let textual_column = kind.is_some_and(|k| k.is_textual());

    match value {
        Value::Null => "NULL".into(),
        Value::Bool(b) if kind.is_some_and(|k| k.is_numeric()) => {
            (if *b { "1" } else { "0" }).into()
        }
        Value::Bool(b) => bool_literal(*b, target).into(),
        Value::Int(n) if boolean_column => bool_literal(*n != 0, target).into(),
        Value::UInt(n) if boolean_column => bool_literal(*n != 0, target).into(),
        Value::Int(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(f) => match target {
            Dialect::PgSql => format!("'{}'", pg_special_float(*f)),
            _ => "NULL".into(),
        },
        Value::Decimal(d) => match special_numeric(d) {
            Some(special) if target == Dialect::PgSql => format!("'{}'::numeric", special),
            Some(_) => "NULL".into(),
            None => d.clone(),
        },
        Value::Text(s) if boolean_column => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" => bool_literal(true, target).into(),
            "0" | "f" | "false" | "n" | "no" => bool_literal(false, target).into(),
            _ => quote_string(s, target),
        },
        Value::Text(s) => quote_string(s, target),
        Value::Bytes(bytes) if textual_column => match std::str::from_utf8(bytes) {
            Ok(s) => quote_string(s, target),
            Err(_) => bytes_literal(bytes, target),
        },
        Value::Bytes(bytes) => bytes_literal(bytes, target),
        Value::Json(json) => quote_string(&json.to_string(), target),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::Timestamp(_) => {
            quote_string(&value.to_text(), target)
        }
    }
}

pub fn bool_literal(value: bool, target: Dialect) -> &'static str {
    match (target, value) {
        (Dialect::PgSql, true) => "TRUE",
        (Dialect::PgSql, false) => "FALSE",
        (_, true) => "1",
        (_, false) => "0",
    }
}

/// Single-quote a string; MySQL also treats backslash as an escape.
pub fn quote_string(s: &str, target: Dialect) -> String {
    let mut escaped = s.replace('\'', "''");
    if target == Dialect::MySql {
        escaped = escaped.replace('\\', "\\\\");
    }
    if target == Dialect::SqlSrv && !s.is_ascii() {
        format!("N'{}'", escaped)
    } else {
        format!("'{}'", escaped)
    }
}

pub fn bytes_literal(bytes: &[u8], target: Dialect) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{:02x}", b);
    }
    match target {
        Dialect::MySql | Dialect::Sqlite => format!("X'{}'", hex),
        Dialect::PgSql => format!("'\\x{}'", hex),
        Dialect::SqlSrv => format!("0x{}", hex),
    }
}

/// PostgreSQL spelling of a non-finite NUMERIC, if `text` is one.
fn special_numeric(text: &str) -> Option<&'static str> {
    match text.trim().to_ascii_lowercase().as_str() {
        "nan" => Some("NaN"),
        "infinity" | "+infinity" | "inf" => Some("Infinity"),
        "-infinity" | "-inf" => Some("-Infinity"),
        _ => None,
    }
}

fn pg_special_float(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}
