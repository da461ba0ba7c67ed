//! `CREATE TABLE` generation.
//!
//! Exporting into the source's own dialect keeps every native type as the
//! catalog spelled it. Exporting across dialects goes through a canonical
//! [`ColumnKind`]: native type → kind → target type, so each dialect only
//! needs one parser and one renderer.

use crate::export::render;
use crate::export::{NEW_LINE, TAB};
use crate::models::{ColumnInfo, Dialect, TableDescriptor};
use crate::typemap::split_type_args;
use std::fmt::Write;
use tracing::debug;

/// Widest NVARCHAR SQL Server accepts before `MAX`.
const SQLSRV_MAX_NVARCHAR: u32 = 4000;
const SQLSRV_MAX_DECIMAL_PRECISION: u32 = 38;

/// Dialect-neutral column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    /// `None` means the source declared no precision.
    Decimal(Option<(u32, u32)>),
    Char(u32),
    /// `0` means unbounded.
    Varchar(u32),
    Text,
    Blob,
    Date,
    Time,
    DateTime,
    TimestampTz,
    Json,
    Uuid,
}

impl ColumnKind {
    /// Parse a native type string from any supported dialect.
    ///
    /// Unrecognized types become [`ColumnKind::Text`].
    pub fn parse(native_type: &str) -> Self {
        let lower = native_type.trim().to_ascii_lowercase();
        let (base, args) = split_type_args(&lower);
        let args = args.unwrap_or_default();
        let mut nums = args
            .split(',')
            .map(|a| a.trim().parse::<u32>().ok());
        let first = nums.next().flatten();
        let second = nums.next().flatten();
        let head = base.split_whitespace().next().unwrap_or_default();

        match head {
            "bool" | "boolean" | "bit" if first.unwrap_or(1) == 1 => Self::Boolean,
            "tinyint" if first == Some(1) => Self::Boolean,
            "bit" => Self::BigInt,
            "tinyint" | "smallint" | "int2" | "year" | "smallserial" => Self::SmallInt,
            "mediumint" | "int" | "integer" | "int4" | "serial" => Self::Int,
            "bigint" | "int8" | "bigserial" => Self::BigInt,
            "real" | "float4" => Self::Float,
            "float" if first.is_some_and(|p| p > 24) => Self::Double,
            "float" => Self::Float,
            "double" | "float8" => Self::Double,
            "decimal" | "numeric" | "dec" | "number" => {
                Self::Decimal(first.map(|p| (p, second.unwrap_or(0))))
            }
            "money" => Self::Decimal(Some((19, 4))),
            "smallmoney" => Self::Decimal(Some((10, 4))),
            "character" if base.contains("varying") => Self::Varchar(first.unwrap_or(0)),
            "char" | "character" | "nchar" | "bpchar" => Self::Char(first.unwrap_or(1)),
            "varchar" | "nvarchar" | "varchar2" | "nvarchar2" => {
                // `max` fails the numeric parse and lands on unbounded
                Self::Varchar(first.unwrap_or(0))
            }
            "binary" | "varbinary" | "bytea" | "image" | "blob" | "tinyblob" | "mediumblob"
            | "longblob" => Self::Blob,
            "date" => Self::Date,
            "time" | "timetz" => Self::Time,
            "timestamptz" | "datetimeoffset" => Self::TimestampTz,
            "timestamp" if base.contains("with time zone") && !base.contains("without") => {
                Self::TimestampTz
            }
            "datetime" | "datetime2" | "smalldatetime" | "timestamp" => Self::DateTime,
            "json" | "jsonb" => Self::Json,
            "uuid" | "uniqueidentifier" => Self::Uuid,
            _ => Self::Text,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Int | Self::BigInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float | Self::Double | Self::Decimal(_))
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Self::Char(_) | Self::Varchar(_) | Self::Text | Self::Json | Self::Uuid
        )
    }

    /// Column type in `target`.
    pub fn render(&self, target: Dialect) -> String {
        match target {
            Dialect::MySql => self.render_mysql(),
            Dialect::PgSql => self.render_pgsql(),
            Dialect::Sqlite => self.render_sqlite(),
            Dialect::SqlSrv => self.render_sqlsrv(),
        }
    }

    fn render_mysql(&self) -> String {
        match self {
            Self::Boolean => "TINYINT(1)".into(),
            Self::SmallInt => "SMALLINT".into(),
            Self::Int => "INT".into(),
            Self::BigInt => "BIGINT".into(),
            Self::Float => "FLOAT".into(),
            Self::Double => "DOUBLE".into(),
            Self::Decimal(Some((p, s))) => format!("DECIMAL({},{})", p, s),
            Self::Decimal(None) => "DECIMAL(65,30)".into(),
            Self::Char(n) => format!("CHAR({})", n),
            Self::Varchar(0) => "LONGTEXT".into(),
            Self::Varchar(n) => format!("VARCHAR({})", n),
            Self::Text => "LONGTEXT".into(),
            Self::Blob => "LONGBLOB".into(),
            Self::Date => "DATE".into(),
            Self::Time => "TIME".into(),
            Self::DateTime => "DATETIME".into(),
            Self::TimestampTz => "TIMESTAMP".into(),
            Self::Json => "JSON".into(),
            Self::Uuid => "CHAR(36)".into(),
        }
    }

    fn render_pgsql(&self) -> String {
        match self {
            Self::Boolean => "BOOLEAN".into(),
            Self::SmallInt => "SMALLINT".into(),
            Self::Int => "INTEGER".into(),
            Self::BigInt => "BIGINT".into(),
            Self::Float => "REAL".into(),
            Self::Double => "DOUBLE PRECISION".into(),
            Self::Decimal(Some((p, s))) => format!("NUMERIC({},{})", p, s),
            Self::Decimal(None) => "NUMERIC".into(),
            Self::Char(n) => format!("CHAR({})", n),
            Self::Varchar(0) | Self::Text => "TEXT".into(),
            Self::Varchar(n) => format!("VARCHAR({})", n),
            Self::Blob => "BYTEA".into(),
            Self::Date => "DATE".into(),
            Self::Time => "TIME".into(),
            Self::DateTime => "TIMESTAMP".into(),
            Self::TimestampTz => "TIMESTAMPTZ".into(),
            Self::Json => "JSONB".into(),
            Self::Uuid => "UUID".into(),
        }
    }

    fn render_sqlite(&self) -> String {
        match self {
            Self::Boolean | Self::SmallInt | Self::Int | Self::BigInt => "INTEGER".into(),
            Self::Float | Self::Double => "REAL".into(),
            Self::Decimal(_) => "NUMERIC".into(),
            Self::Char(_) | Self::Varchar(_) | Self::Text | Self::Json | Self::Uuid => {
                "TEXT".into()
            }
            Self::Blob => "BLOB".into(),
            Self::Date => "DATE".into(),
            Self::Time => "TIME".into(),
            Self::DateTime | Self::TimestampTz => "DATETIME".into(),
        }
    }

    fn render_sqlsrv(&self) -> String {
        match self {
            Self::Boolean => "BIT".into(),
            Self::SmallInt => "SMALLINT".into(),
            Self::Int => "INT".into(),
            Self::BigInt => "BIGINT".into(),
            Self::Float => "REAL".into(),
            Self::Double => "FLOAT".into(),
            Self::Decimal(Some((p, s))) => {
                let p = (*p).min(SQLSRV_MAX_DECIMAL_PRECISION);
                format!("DECIMAL({},{})", p, (*s).min(p))
            }
            Self::Decimal(None) => "DECIMAL(38,10)".into(),
            Self::Char(n) if *n <= SQLSRV_MAX_NVARCHAR => format!("NCHAR({})", n),
            Self::Varchar(n) if *n > 0 && *n <= SQLSRV_MAX_NVARCHAR => {
                format!("NVARCHAR({})", n)
            }
            Self::Char(_) | Self::Varchar(_) | Self::Text | Self::Json => {
                "NVARCHAR(MAX)".into()
            }
            Self::Blob => "VARBINARY(MAX)".into(),
            Self::Date => "DATE".into(),
            Self::Time => "TIME".into(),
            Self::DateTime => "DATETIME2".into(),
            Self::TimestampTz => "DATETIMEOFFSET".into(),
            Self::Uuid => "UNIQUEIDENTIFIER".into(),
        }
    }
}

/// Renders table definitions from one source dialect into a target dialect.
#[derive(Debug, Clone, Copy)]
pub struct DdlWriter {
    source: Dialect,
    target: Dialect,
}

impl DdlWriter {
    pub fn new(source: Dialect, target: Dialect) -> Self {
        Self { source, target }
    }

    /// The full `CREATE TABLE` statement, terminated by `;`.
    ///
    /// `name` is the already-quoted table name in the target dialect.
    pub fn create_table(&self, table: &TableDescriptor, name: &str) -> String {
        let pk = table.primary_key();
        // SQLite only allows AUTOINCREMENT on an inline single-column key
        let inline_pk = self.target == Dialect::Sqlite
            && pk.len() == 1
            && table.columns.values().any(|c| c.primary_key && c.auto_increment);

        let mut definitions: Vec<String> = table
            .columns
            .values()
            .map(|c| self.column_definition(c, inline_pk))
            .collect();

        if !pk.is_empty() && !inline_pk {
            definitions.push(format!("PRIMARY KEY ({})", self.column_list(&pk)));
        }
        for fk in &table.foreign_keys {
            definitions.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                self.target.quote_identifier(&fk.column),
                self.target.quote_identifier(&fk.referenced_table),
                self.target.quote_identifier(&fk.referenced_column),
            ));
        }

        let mut sql = String::new();
        if self.target.supports_if_not_exists() {
            sql.push_str("CREATE TABLE IF NOT EXISTS ");
        } else {
            let object = match table.schema.as_deref().filter(|_| self.keeps_schema()) {
                Some(schema) => format!("{}.{}", schema, table.name),
                None => table.name.clone(),
            };
            let _ = write!(
                sql,
                "IF OBJECT_ID(N'{}', N'U') IS NULL{}CREATE TABLE ",
                object.replace('\'', "''"),
                NEW_LINE
            );
        }
        let separator = format!(", {}{}", NEW_LINE, TAB);
        let _ = write!(
            sql,
            "{} ({}{}{}{});",
            name,
            NEW_LINE,
            TAB,
            definitions.join(&separator),
            NEW_LINE
        );
        sql
    }

    fn keeps_schema(&self) -> bool {
        self.source == self.target
    }

    fn column_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.target.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn column_definition(&self, column: &ColumnInfo, inline_pk: bool) -> String {
        let kind = ColumnKind::parse(&column.native_type);
        let name = self.target.quote_identifier(&column.name);

        if column.auto_increment {
            if let Some(def) = self.auto_increment(&name, column, kind, inline_pk) {
                return def;
            }
        }

        let mut def = format!("{} {}", name, self.column_type(column, kind));
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.default_value(column, kind) {
            let _ = write!(def, " DEFAULT {}", default);
        }
        def
    }

    fn column_type(&self, column: &ColumnInfo, kind: ColumnKind) -> String {
        if self.source == self.target && !column.native_type.trim().is_empty() {
            column.native_type.clone()
        } else {
            kind.render(self.target)
        }
    }

    fn auto_increment(
        &self,
        name: &str,
        column: &ColumnInfo,
        kind: ColumnKind,
        inline_pk: bool,
    ) -> Option<String> {
        let ty = self.column_type(column, kind);
        match self.target {
            Dialect::MySql => Some(format!("{} {} NOT NULL AUTO_INCREMENT", name, ty)),
            Dialect::PgSql => match kind {
                ColumnKind::BigInt => Some(format!("{} BIGSERIAL", name)),
                ColumnKind::SmallInt | ColumnKind::Int | ColumnKind::Boolean => {
                    Some(format!("{} SERIAL", name))
                }
                _ => None,
            },
            Dialect::Sqlite if inline_pk && column.primary_key => {
                Some(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name))
            }
            Dialect::Sqlite => None,
            Dialect::SqlSrv => Some(format!("{} {} IDENTITY(1,1) NOT NULL", name, ty)),
        }
    }

    /// Carry a column default over, translating what is portable.
    ///
    /// MySQL reports bare default values; the other catalogs report SQL
    /// expressions. Expressions that only make sense in the source dialect
    /// are dropped when the target differs.
    fn default_value(&self, column: &ColumnInfo, kind: ColumnKind) -> Option<String> {
        let raw = column.default.as_deref()?.trim();
        let upper = raw.to_ascii_uppercase();

        // MySQL before 8.0.13 rejects literal defaults on TEXT/BLOB/JSON columns
        if self.target == Dialect::MySql
            && self.source != self.target
            && matches!(
                kind,
                ColumnKind::Text | ColumnKind::Varchar(0) | ColumnKind::Blob | ColumnKind::Json
            )
            && upper != "NULL"
        {
            debug!(column = %column.name, default = %raw, "Dropping default on MySQL LOB column");
            return None;
        }

        match upper.as_str() {
            "NULL" => return Some("NULL".into()),
            "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" | "NOW()" | "GETDATE()" => {
                return Some("CURRENT_TIMESTAMP".into());
            }
            "CURRENT_DATE" | "CURDATE()" => return Some("CURRENT_DATE".into()),
            "TRUE" | "FALSE" => {
                return Some(render::bool_literal(upper == "TRUE", self.target).into());
            }
            _ => {}
        }

        if kind == ColumnKind::Boolean && (raw == "0" || raw == "1" || raw == "'0'" || raw == "'1'")
        {
            return Some(render::bool_literal(raw.contains('1'), self.target).into());
        }
        if kind.is_numeric() && raw.parse::<f64>().is_ok() {
            return Some(raw.to_string());
        }
        if let Some(bits) = bit_literal(raw) {
            return Some(match kind {
                ColumnKind::Boolean => render::bool_literal(bits != 0, self.target).into(),
                _ if self.source == self.target => raw.to_string(),
                _ => bits.to_string(),
            });
        }

        if self.source == Dialect::MySql {
            return Some(render::quote_string(raw, self.target));
        }

        // 'value'::character varying
        let literal = match raw.rfind("::") {
            Some(idx) if self.source == Dialect::PgSql && raw.starts_with('\'') => &raw[..idx],
            _ => raw,
        };
        if let Some(inner) = literal
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
        {
            return Some(render::quote_string(&inner.replace("''", "'"), self.target));
        }
        if literal.parse::<f64>().is_ok() {
            return Some(literal.to_string());
        }

        if self.source == self.target {
            Some(raw.to_string())
        } else {
            debug!(
                column = %column.name,
                default = %raw,
                target = %self.target,
                "Dropping non-portable column default"
            );
            None
        }
    }
}

/// Value of a `b'0101'` bit literal.
fn bit_literal(raw: &str) -> Option<u64> {
    let digits = raw
        .strip_prefix("b'")
        .or_else(|| raw.strip_prefix("B'"))?
        .strip_suffix('\'')?;
    u64::from_str_radix(digits, 2).ok()
}
