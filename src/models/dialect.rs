//! SQL dialects and driver name normalization.
//!
//! Every driver alias a caller can hand us resolves to exactly one
//! [`Dialect`] here. Downstream code matches on the enum and never on the
//! raw driver string.

use crate::error::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};

/// Canonical SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Dialect {
    /// Includes MariaDB
    MySql,
    PgSql,
    Sqlite,
    SqlSrv,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Self::MySql, Self::PgSql, Self::Sqlite, Self::SqlSrv];

    /// Normalize a raw driver identifier.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Anything outside the alias table fails with
    /// [`ExportError::UnsupportedDriver`] carrying the raw value.
    pub fn normalize(raw: &str) -> ExportResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" | "mysqlnd" => Ok(Self::MySql),
            "pgsql" | "postgresql" => Ok(Self::PgSql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "sqlsrv" | "mssql" | "dblib" => Ok(Self::SqlSrv),
            _ => Err(ExportError::unsupported_driver(raw)),
        }
    }

    /// Detect the dialect from a connection URL scheme.
    ///
    /// `postgres://` is accepted alongside the driver aliases since it is the
    /// scheme most PostgreSQL URLs use.
    pub fn from_connection_string(connection_string: &str) -> ExportResult<Self> {
        let scheme = connection_string
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or(connection_string);
        if scheme.eq_ignore_ascii_case("postgres") {
            return Ok(Self::PgSql);
        }
        Self::normalize(scheme)
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PgSql => "pgsql",
            Self::Sqlite => "sqlite",
            Self::SqlSrv => "sqlsrv",
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::PgSql => "PostgreSQL",
            Self::Sqlite => "SQLite",
            Self::SqlSrv => "SQL Server",
        }
    }

    /// Schema assumed when a pgsql export does not name one.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            Self::PgSql => Some("public"),
            _ => None,
        }
    }

    /// Whether `CREATE TABLE IF NOT EXISTS` is understood.
    pub fn supports_if_not_exists(&self) -> bool {
        !matches!(self, Self::SqlSrv)
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::PgSql | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::SqlSrv => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Quote `schema.table`, or just the table when no schema applies.
    pub fn qualified_name(&self, schema: Option<&str>, table: &str) -> String {
        match schema.filter(|s| !s.is_empty()) {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
            None => self.quote_identifier(table),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for Dialect {
    type Error = ExportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases() {
        let cases = [
            ("mysql", Dialect::MySql),
            ("mariadb", Dialect::MySql),
            ("mysqlnd", Dialect::MySql),
            ("pgsql", Dialect::PgSql),
            ("postgresql", Dialect::PgSql),
            ("sqlite", Dialect::Sqlite),
            ("sqlite3", Dialect::Sqlite),
            ("sqlsrv", Dialect::SqlSrv),
            ("mssql", Dialect::SqlSrv),
            ("dblib", Dialect::SqlSrv),
        ];
        for (raw, expected) in cases {
            assert_eq!(Dialect::normalize(raw).unwrap(), expected, "alias {raw}");
        }
    }

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(Dialect::normalize("  MariaDB ").unwrap(), Dialect::MySql);
        assert_eq!(Dialect::normalize("PgSQL").unwrap(), Dialect::PgSql);
        assert_eq!(Dialect::normalize("\tSQLITE3\n").unwrap(), Dialect::Sqlite);
    }

    #[test]
    fn test_normalize_unknown_keeps_raw_value() {
        for raw in ["oracle", "", "postgres", "my sql"] {
            match Dialect::normalize(raw) {
                Err(ExportError::UnsupportedDriver { driver }) => assert_eq!(driver, raw),
                other => panic!("expected UnsupportedDriver for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_connection_string() {
        assert_eq!(
            Dialect::from_connection_string("postgres://u:p@h/db").unwrap(),
            Dialect::PgSql
        );
        assert_eq!(
            Dialect::from_connection_string("mariadb://h/db").unwrap(),
            Dialect::MySql
        );
        assert_eq!(
            Dialect::from_connection_string("sqlite:data.db").unwrap(),
            Dialect::Sqlite
        );
        assert!(Dialect::from_connection_string("oracle://h/db").is_err());
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::MySql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(Dialect::PgSql.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::SqlSrv.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(
            Dialect::PgSql.qualified_name(Some("public"), "users"),
            "\"public\".\"users\""
        );
        assert_eq!(Dialect::MySql.qualified_name(None, "users"), "`users`");
        assert_eq!(Dialect::MySql.qualified_name(Some(""), "users"), "`users`");
    }

    #[test]
    fn test_serde_round_trip_uses_canonical_names() {
        let json = serde_json::to_string(&Dialect::SqlSrv).unwrap();
        assert_eq!(json, "\"sqlsrv\"");
        let parsed: Dialect = serde_json::from_str("\"MSSQL\"").unwrap();
        assert_eq!(parsed, Dialect::SqlSrv);
        assert!(serde_json::from_str::<Dialect>("\"db2\"").is_err());
    }
}
