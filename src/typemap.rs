//! Native column type to logical export type classification.
//!
//! The writers only care about six logical types. Native type strings from
//! any dialect are reduced to one of them by a substring table where the
//! longest matching key wins, so `bigint` beats `int` and `datetime` beats
//! `date`.

use serde::{Deserialize, Serialize};

/// Logical type of an exported column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Integer,
    Double,
    String,
    DateTime,
    Date,
    Time,
}

impl LogicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Double)
    }

    /// Spreadsheet number format for cells of this type.
    ///
    /// Doubles only get a format when a precision is known.
    pub fn cell_format(&self, precision: Option<usize>) -> Option<String> {
        match self {
            Self::Integer => Some("0".to_string()),
            Self::Double => precision.map(number_format),
            Self::DateTime => Some("yyyy-mm-dd hh:mm:ss".to_string()),
            Self::Date => Some("yyyy-mm-dd".to_string()),
            Self::Time => Some("hh:mm:ss".to_string()),
            Self::String => None,
        }
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const TYPE_TABLE: &[(&str, LogicalType)] = &[
    // Floating point and exact numerics
    ("double", LogicalType::Double),
    ("float", LogicalType::Double),
    ("numeric", LogicalType::Double),
    ("decimal", LogicalType::Double),
    ("real", LogicalType::Double),
    ("money", LogicalType::Double),
    // Integers
    ("bigint", LogicalType::Integer),
    ("smallint", LogicalType::Integer),
    ("tinyint", LogicalType::Integer),
    ("integer", LogicalType::Integer),
    ("int", LogicalType::Integer),
    ("serial", LogicalType::Integer),
    ("bigserial", LogicalType::Integer),
    // Strings
    ("varchar", LogicalType::String),
    ("character varying", LogicalType::String),
    ("char", LogicalType::String),
    ("character", LogicalType::String),
    ("tinytext", LogicalType::String),
    ("mediumtext", LogicalType::String),
    ("longtext", LogicalType::String),
    ("text", LogicalType::String),
    ("string", LogicalType::String),
    ("enum", LogicalType::String),
    ("blob", LogicalType::String),
    ("bool", LogicalType::String),
    ("boolean", LogicalType::String),
    // Names that would otherwise hit "int"
    ("interval", LogicalType::String),
    ("point", LogicalType::String),
    // Date and time
    ("timestamp", LogicalType::DateTime),
    ("timestamp without time zone", LogicalType::DateTime),
    ("timestamp with time zone", LogicalType::DateTime),
    ("datetime", LogicalType::DateTime),
    ("date", LogicalType::Date),
    ("time", LogicalType::Time),
    ("time without time zone", LogicalType::Time),
    ("time with time zone", LogicalType::Time),
];

/// Classify a native column type.
///
/// The type is lowercased, parenthesized arguments are dropped and
/// whitespace is collapsed before matching. `tinyint(1)` is the single
/// exception where the arguments matter: MySQL uses it for booleans, so it
/// classifies as [`LogicalType::String`] while any other `tinyint(n)` is an
/// integer. Unknown types fall back to string.
pub fn classify(native_type: &str) -> LogicalType {
    let lower = native_type.trim().to_ascii_lowercase();
    let (base, args) = split_type_args(&lower);

    if base.split_whitespace().next() == Some("tinyint") && args.as_deref() == Some("1") {
        return LogicalType::String;
    }

    TYPE_TABLE
        .iter()
        .filter(|(key, _)| base.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, logical)| *logical)
        .unwrap_or(LogicalType::String)
}

/// Spreadsheet number format for a double with `precision` digits: `#,` then
/// `#` repeated `precision` times then `0`.
pub fn number_format(precision: usize) -> String {
    format!("#,{}0", "#".repeat(precision))
}

/// Split `numeric(10, 2) unsigned` into `("numeric unsigned", Some("10,2"))`.
pub(crate) fn split_type_args(lower: &str) -> (String, Option<String>) {
    let mut base = String::with_capacity(lower.len());
    let mut args: Option<String> = None;
    let mut depth = 0usize;

    for ch in lower.chars() {
        match ch {
            '(' => {
                depth += 1;
                if depth == 1 && args.is_none() {
                    args = Some(String::new());
                }
                base.push(' ');
            }
            ')' => depth = depth.saturating_sub(1),
            c if depth > 0 => {
                if let Some(a) = args.as_mut() {
                    if !c.is_whitespace() {
                        a.push(c);
                    }
                }
            }
            c => base.push(c),
        }
    }

    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");
    (base, args)
}
