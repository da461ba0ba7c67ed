//! Schema introspection module.
//!
//! Lists tables and describes their columns for every supported dialect.
//!
//! # Architecture
//!
//! Catalog SQL lives in the `queries` submodule as per-dialect templates.
//! Dialect-specific readers (mysql, postgres, sqlite, sqlsrv) turn catalog
//! rows into a [`TableDescriptor`], each providing the same interface. All of
//! them run over the [`Connection`] seam, so any handle reporting a supported
//! driver name can be introspected.

use crate::db::connection::{Connection, dialect_of, fetch_all};
use crate::error::{ExportError, ExportResult};
use crate::models::{Dialect, Row, TableDescriptor};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key: dialect, effective schema and table name.
type CacheKey = (Dialect, Option<String>, String);

/// Caller-owned cache of table descriptors.
///
/// The introspector never keeps state between calls; pass a cache to
/// [`SchemaIntrospector::describe`] to reuse descriptors across exports.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<CacheKey, TableDescriptor>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(
        &self,
        dialect: Dialect,
        schema: Option<&str>,
        table: &str,
    ) -> Option<TableDescriptor> {
        let key = (dialect, schema.map(str::to_string), table.to_string());
        self.entries.read().await.get(&key).cloned()
    }

    pub async fn insert(&self, dialect: Dialect, descriptor: TableDescriptor) {
        let key = (
            dialect,
            descriptor.schema.clone(),
            descriptor.name.clone(),
        );
        self.entries.write().await.insert(key, descriptor);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Schema introspector for export sources.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// List base tables in catalog order.
    ///
    /// `schema` selects the pgsql schema (default `public`), the mysql
    /// database, or the sqlsrv schema. SQLite ignores it.
    pub async fn list_tables<C>(conn: &C, schema: Option<&str>) -> ExportResult<Vec<String>>
    where
        C: Connection + ?Sized,
    {
        let dialect = dialect_of(conn)?;
        let schema = effective_schema(dialect, schema);
        let sql = match dialect {
            Dialect::MySql => mysql::list_tables_sql(schema.as_deref()),
            Dialect::PgSql => postgres::list_tables_sql(schema.as_deref()),
            Dialect::Sqlite => queries::sqlite::LIST_TABLES.to_string(),
            Dialect::SqlSrv => sqlsrv::list_tables_sql(schema.as_deref()),
        };

        let rows = fetch_all(conn, &sql)
            .await
            .map_err(|e| e.for_table("*", dialect))?;

        let tables: Vec<String> = rows
            .iter()
            .filter_map(|row| row.values().first().map(|v| v.to_text()))
            .filter(|name| !name.is_empty())
            .collect();

        debug!(count = tables.len(), dialect = %dialect, "Listed tables");
        Ok(tables)
    }

    /// Describe one table: columns in catalog order with their logical types.
    pub async fn list_columns<C>(
        conn: &C,
        table: &str,
        schema: Option<&str>,
    ) -> ExportResult<TableDescriptor>
    where
        C: Connection + ?Sized,
    {
        let dialect = dialect_of(conn)?;
        let schema = effective_schema(dialect, schema);
        let result = match dialect {
            Dialect::MySql => mysql::describe_table(conn, table, schema).await,
            Dialect::PgSql => postgres::describe_table(conn, table, schema).await,
            Dialect::Sqlite => sqlite::describe_table(conn, table).await,
            Dialect::SqlSrv => sqlsrv::describe_table(conn, table, schema).await,
        };
        let descriptor = result.map_err(|e| e.for_table(table, dialect))?;

        if descriptor.columns.is_empty() {
            return Err(ExportError::schema_introspection(
                table,
                dialect,
                format!("Table '{}' not found", table),
            ));
        }

        debug!(
            table = %table,
            dialect = %dialect,
            columns = descriptor.columns.len(),
            "Described table"
        );
        Ok(descriptor)
    }

    /// [`list_columns`](Self::list_columns) through an optional cache.
    pub async fn describe<C>(
        conn: &C,
        table: &str,
        schema: Option<&str>,
        cache: Option<&SchemaCache>,
    ) -> ExportResult<TableDescriptor>
    where
        C: Connection + ?Sized,
    {
        let Some(cache) = cache else {
            return Self::list_columns(conn, table, schema).await;
        };

        let dialect = dialect_of(conn)?;
        let key_schema = effective_schema(dialect, schema);
        if let Some(hit) = cache.get(dialect, key_schema.as_deref(), table).await {
            debug!(table = %table, "Schema cache hit");
            return Ok(hit);
        }

        let descriptor = Self::list_columns(conn, table, schema).await?;
        cache.insert(dialect, descriptor.clone()).await;
        Ok(descriptor)
    }
}

/// Schema actually queried: pgsql falls back to `public`, blanks are dropped.
pub fn effective_schema(dialect: Dialect, schema: Option<&str>) -> Option<String> {
    match schema.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(s.to_string()),
        None => dialect.default_schema().map(str::to_string),
    }
}

/// Single-quote a catalog literal, doubling embedded quotes.
///
/// Table names come from the catalog or the operator, never from row data.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Substitute `:table` and `:schema` placeholders in a catalog template.
fn bind(template: &str, table: &str, schema: &str) -> String {
    template.replace(":table", table).replace(":schema", schema)
}

fn is_truthy(row: &Row, column: &str) -> bool {
    matches!(
        row.text(column).as_deref().map(str::trim),
        Some("1") | Some("t") | Some("true") | Some("YES") | Some("yes")
    )
}

// =============================================================================
// SQL Query Constants
// =============================================================================

mod queries {
    pub mod mysql {
        pub const LIST_TABLES: &str = "SHOW TABLES";
        pub const LIST_TABLES_IN: &str = "SHOW TABLES FROM :schema";
        pub const DESCRIBE: &str = "DESCRIBE :table";

        pub const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_NAME = :table
        AND TABLE_SCHEMA = :schema
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY ORDINAL_POSITION
        "#;
    }

    pub mod postgres {
        pub const LIST_TABLES: &str =
            "SELECT tablename FROM pg_tables WHERE schemaname = :schema ORDER BY tablename";

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            column_name,
            data_type,
            is_nullable,
            column_default,
            character_maximum_length,
            numeric_precision,
            numeric_scale
        FROM information_schema.columns
        WHERE table_name = :table AND table_schema = :schema
        ORDER BY ordinal_position
        "#;

        pub const PRIMARY_KEY: &str = r#"
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_name = :table
        AND tc.table_schema = :schema
        AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        "#;

        pub const FOREIGN_KEYS: &str = r#"
        SELECT
            kcu.column_name,
            ccu.table_name AS foreign_table_name,
            ccu.column_name AS foreign_column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.table_name = :table
        AND tc.table_schema = :schema
        AND tc.constraint_type = 'FOREIGN KEY'
        ORDER BY kcu.ordinal_position
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str =
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'";
        pub const TABLE_INFO: &str = "PRAGMA table_info(:table)";
        pub const FOREIGN_KEYS: &str = "PRAGMA foreign_key_list(:table)";
        pub const CREATE_SQL: &str =
            "SELECT sql FROM sqlite_master WHERE type='table' AND name = :table";
    }

    pub mod sqlsrv {
        pub const LIST_TABLES: &str = "SELECT name FROM sysobjects WHERE xtype = 'U' ORDER BY name";
        pub const LIST_TABLES_IN: &str = r#"
        SELECT t.name
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE s.name = :schema
        ORDER BY t.name
        "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.name,
            t.name AS type_name,
            c.max_length,
            c.precision,
            c.scale,
            c.is_nullable,
            c.is_identity,
            CASE WHEN EXISTS (
                SELECT 1
                FROM sys.index_columns ic
                JOIN sys.indexes i
                    ON i.object_id = ic.object_id AND i.index_id = ic.index_id
                WHERE i.is_primary_key = 1
                AND ic.object_id = c.object_id
                AND ic.column_id = c.column_id
            ) THEN 1 ELSE 0 END AS is_primary_key
        FROM sys.columns c
        JOIN sys.types t ON c.user_type_id = t.user_type_id
        WHERE c.object_id = OBJECT_ID(:table)
        ORDER BY c.column_id
        "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use crate::models::{ColumnInfo, ForeignKey};

    pub fn list_tables_sql(schema: Option<&str>) -> String {
        match schema {
            Some(db) => bind(
                queries::mysql::LIST_TABLES_IN,
                "",
                &Dialect::MySql.quote_identifier(db),
            ),
            None => queries::mysql::LIST_TABLES.to_string(),
        }
    }

    pub async fn describe_table<C: Connection + ?Sized>(
        conn: &C,
        table: &str,
        schema: Option<String>,
    ) -> ExportResult<TableDescriptor> {
        let target = Dialect::MySql.qualified_name(schema.as_deref(), table);
        let rows = fetch_all(conn, &bind(queries::mysql::DESCRIBE, &target, "")).await?;

        let mut descriptor = TableDescriptor::new(table).with_schema(schema.clone());
        for row in &rows {
            let Some(name) = row.text("Field") else {
                continue;
            };
            let native = row.text("Type").unwrap_or_default();
            let extra = row.text("Extra").unwrap_or_default().to_ascii_lowercase();
            descriptor.push_column(
                ColumnInfo::new(name, native)
                    .with_nullable(is_truthy(row, "Null"))
                    .with_default(row.get("Default").filter(|v| !v.is_null()).map(|v| v.to_text()))
                    .with_primary_key(row.text("Key").as_deref() == Some("PRI"))
                    .with_auto_increment(extra.contains("auto_increment")),
            );
        }

        descriptor.foreign_keys = foreign_keys(conn, table, schema.as_deref()).await;
        Ok(descriptor)
    }

    async fn foreign_keys<C: Connection + ?Sized>(
        conn: &C,
        table: &str,
        schema: Option<&str>,
    ) -> Vec<ForeignKey> {
        let schema = schema.map(literal).unwrap_or_else(|| "DATABASE()".to_string());
        let sql = bind(queries::mysql::FOREIGN_KEYS, &literal(table), &schema);
        match fetch_all(conn, &sql).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| {
                    Some(ForeignKey {
                        column: row.text("COLUMN_NAME")?,
                        referenced_table: row.text("REFERENCED_TABLE_NAME")?,
                        referenced_column: row.text("REFERENCED_COLUMN_NAME")?,
                    })
                })
                .collect(),
            Err(e) => {
                debug!(table = %table, error = %e, "Foreign keys unavailable");
                Vec::new()
            }
        }
    }
}

mod postgres {
    use super::*;
    use crate::models::{ColumnInfo, ForeignKey};

    pub fn list_tables_sql(schema: Option<&str>) -> String {
        bind(
            queries::postgres::LIST_TABLES,
            "",
            &literal(schema.unwrap_or("public")),
        )
    }

    pub async fn describe_table<C: Connection + ?Sized>(
        conn: &C,
        table: &str,
        schema: Option<String>,
    ) -> ExportResult<TableDescriptor> {
        let schema_name = schema.clone().unwrap_or_else(|| "public".to_string());
        let table_lit = literal(table);
        let schema_lit = literal(&schema_name);

        let rows = fetch_all(
            conn,
            &bind(queries::postgres::DESCRIBE_COLUMNS, &table_lit, &schema_lit),
        )
        .await?;
        let primary_key: Vec<String> = fetch_all(
            conn,
            &bind(queries::postgres::PRIMARY_KEY, &table_lit, &schema_lit),
        )
        .await?
        .iter()
        .filter_map(|row| row.text("column_name"))
        .collect();

        let mut descriptor = TableDescriptor::new(table).with_schema(Some(schema_name));
        for row in &rows {
            let Some(name) = row.text("column_name") else {
                continue;
            };
            let default = row.text("column_default");
            let serial = default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
            let is_pk = primary_key.contains(&name);
            descriptor.push_column(
                ColumnInfo::new(name, native_type(row))
                    .with_nullable(is_truthy(row, "is_nullable"))
                    .with_default(if serial { None } else { default })
                    .with_primary_key(is_pk)
                    .with_auto_increment(serial),
            );
        }

        descriptor.foreign_keys = match fetch_all(
            conn,
            &bind(queries::postgres::FOREIGN_KEYS, &table_lit, &schema_lit),
        )
        .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| {
                    Some(ForeignKey {
                        column: row.text("column_name")?,
                        referenced_table: row.text("foreign_table_name")?,
                        referenced_column: row.text("foreign_column_name")?,
                    })
                })
                .collect(),
            Err(e) => {
                debug!(table = %table, error = %e, "Foreign keys unavailable");
                Vec::new()
            }
        };
        Ok(descriptor)
    }

    /// Rebuild `character varying(255)` / `numeric(10,2)` from the split columns.
    fn native_type(row: &Row) -> String {
        let data_type = row.text("data_type").unwrap_or_default();
        if let Some(len) = row.text("character_maximum_length") {
            return format!("{}({})", data_type, len);
        }
        if data_type == "numeric" {
            if let (Some(p), Some(s)) = (
                row.text("numeric_precision"),
                row.text("numeric_scale"),
            ) {
                return format!("numeric({},{})", p, s);
            }
        }
        data_type
    }
}

mod sqlite {
    use super::*;
    use crate::models::{ColumnInfo, ForeignKey};

    pub async fn describe_table<C: Connection + ?Sized>(
        conn: &C,
        table: &str,
    ) -> ExportResult<TableDescriptor> {
        let table_lit = literal(table);
        let rows = fetch_all(conn, &bind(queries::sqlite::TABLE_INFO, &table_lit, "")).await?;

        let create_sql = fetch_all(conn, &bind(queries::sqlite::CREATE_SQL, &table_lit, ""))
            .await?
            .first()
            .and_then(|row| row.text("sql"))
            .unwrap_or_default()
            .to_ascii_uppercase();
        let autoincrement = create_sql.contains("AUTOINCREMENT");

        let mut descriptor = TableDescriptor::new(table);
        for row in &rows {
            let Some(name) = row.text("name") else {
                continue;
            };
            let native = row.text("type").unwrap_or_default();
            let is_pk = row.text("pk").is_some_and(|pk| pk != "0");
            let auto = autoincrement && is_pk && native.eq_ignore_ascii_case("integer");
            descriptor.push_column(
                ColumnInfo::new(name, native)
                    .with_nullable(!is_truthy(row, "notnull"))
                    .with_default(row.text("dflt_value"))
                    .with_primary_key(is_pk)
                    .with_auto_increment(auto),
            );
        }

        descriptor.foreign_keys =
            match fetch_all(conn, &bind(queries::sqlite::FOREIGN_KEYS, &table_lit, "")).await {
                Ok(rows) => rows
                    .iter()
                    .filter_map(|row| {
                        Some(ForeignKey {
                            column: row.text("from")?,
                            referenced_table: row.text("table")?,
                            referenced_column: row.text("to")?,
                        })
                    })
                    .collect(),
                Err(e) => {
                    debug!(table = %table, error = %e, "Foreign keys unavailable");
                    Vec::new()
                }
            };
        Ok(descriptor)
    }
}

mod sqlsrv {
    use super::*;
    use crate::models::ColumnInfo;

    pub fn list_tables_sql(schema: Option<&str>) -> String {
        match schema {
            Some(s) => bind(queries::sqlsrv::LIST_TABLES_IN, "", &literal(s)),
            None => queries::sqlsrv::LIST_TABLES.to_string(),
        }
    }

    pub async fn describe_table<C: Connection + ?Sized>(
        conn: &C,
        table: &str,
        schema: Option<String>,
    ) -> ExportResult<TableDescriptor> {
        let object = match schema.as_deref() {
            Some(s) => format!("{}.{}", s, table),
            None => table.to_string(),
        };
        let rows = fetch_all(
            conn,
            &bind(queries::sqlsrv::DESCRIBE_COLUMNS, &literal(&object), ""),
        )
        .await?;

        let mut descriptor = TableDescriptor::new(table).with_schema(schema);
        for row in &rows {
            let Some(name) = row.text("name") else {
                continue;
            };
            let nullable = match row.text("is_nullable") {
                Some(_) => is_truthy(row, "is_nullable"),
                None => true,
            };
            descriptor.push_column(
                ColumnInfo::new(name, native_type(row))
                    .with_nullable(nullable)
                    .with_primary_key(is_truthy(row, "is_primary_key"))
                    .with_auto_increment(is_truthy(row, "is_identity")),
            );
        }
        Ok(descriptor)
    }

    /// `nvarchar` lengths are reported in bytes; `-1` means `max`.
    fn native_type(row: &Row) -> String {
        let type_name = row.text("type_name").unwrap_or_default();
        let lower = type_name.to_ascii_lowercase();
        let max_length = row.text("max_length").and_then(|v| v.parse::<i64>().ok());
        match (lower.as_str(), max_length) {
            ("varchar" | "char" | "varbinary" | "binary", Some(-1)) => format!("{}(max)", type_name),
            ("nvarchar" | "nchar", Some(-1)) => format!("{}(max)", type_name),
            ("varchar" | "char" | "varbinary" | "binary", Some(n)) => format!("{}({})", type_name, n),
            ("nvarchar" | "nchar", Some(n)) => format!("{}({})", type_name, n / 2),
            ("decimal" | "numeric", _) => match (row.text("precision"), row.text("scale")) {
                (Some(p), Some(s)) => format!("{}({},{})", type_name, p, s),
                _ => type_name,
            },
            _ => type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, Value};
    use crate::typemap::LogicalType;
    use futures_util::stream::{self, BoxStream, StreamExt};
    use std::sync::Mutex;

    /// Replays canned result sets keyed by a substring of the SQL.
    struct Scripted {
        driver: &'static str,
        responses: Vec<(&'static str, Vec<Row>)>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(driver: &'static str) -> Self {
            Self {
                driver,
                responses: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn on(mut self, needle: &'static str, rows: Vec<Row>) -> Self {
            self.responses.push((needle, rows));
            self
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Connection for Scripted {
        fn driver_name(&self) -> &str {
            self.driver
        }

        fn fetch<'a>(&'a self, sql: &'a str) -> BoxStream<'a, ExportResult<Row>> {
            self.seen.lock().unwrap().push(sql.to_string());
            let rows = self
                .responses
                .iter()
                .find(|(needle, _)| sql.contains(needle))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default();
            stream::iter(rows.into_iter().map(Ok)).boxed()
        }
    }

    fn describe_row(field: &str, ty: &str, null: &str, key: &str, extra: &str) -> Row {
        Row::from_pairs([
            ("Field", Value::from(field)),
            ("Type", Value::from(ty)),
            ("Null", Value::from(null)),
            ("Key", Value::from(key)),
            ("Default", Value::Null),
            ("Extra", Value::from(extra)),
        ])
    }

    #[tokio::test]
    async fn test_mysql_describe_keeps_catalog_order() {
        let conn = Scripted::new("mariadb").on(
            "DESCRIBE",
            vec![
                describe_row("id", "int(11)", "NO", "PRI", "auto_increment"),
                describe_row("zeta", "tinyint(1)", "YES", "", ""),
                describe_row("alpha", "decimal(10,2)", "YES", "", ""),
            ],
        );

        let table = SchemaIntrospector::list_columns(&conn, "users", None)
            .await
            .unwrap();
        let names: Vec<_> = table.columns.keys().cloned().collect();
        assert_eq!(names, vec!["id", "zeta", "alpha"]);
        assert_eq!(table.columns["id"].logical_type, LogicalType::Integer);
        assert!(table.columns["id"].auto_increment);
        assert!(!table.columns["id"].nullable);
        assert_eq!(table.columns["zeta"].logical_type, LogicalType::String);
        assert_eq!(table.columns["alpha"].logical_type, LogicalType::Double);
        assert!(conn.seen()[0].contains("DESCRIBE `users`"));
    }

    #[tokio::test]
    async fn test_sqlsrv_catalog_queries() {
        let conn = Scripted::new("mssql")
            .on(
                "sysobjects",
                vec![Row::from_pairs([("name", "orders")])],
            )
            .on(
                "sys.columns",
                vec![Row::from_pairs([
                    ("name", Value::from("created")),
                    ("type_name", Value::from("datetime2")),
                    ("max_length", Value::Int(8)),
                    ("is_nullable", Value::Bool(true)),
                    ("is_identity", Value::Bool(false)),
                    ("is_primary_key", Value::Int(0)),
                ])],
            );

        let tables = SchemaIntrospector::list_tables(&conn, None).await.unwrap();
        assert_eq!(tables, vec!["orders"]);

        let table = SchemaIntrospector::list_columns(&conn, "orders", None)
            .await
            .unwrap();
        assert_eq!(table.columns["created"].logical_type, LogicalType::DateTime);
        assert!(conn.seen()[1].contains("OBJECT_ID('orders')"));
    }

    #[tokio::test]
    async fn test_pgsql_defaults_to_public_schema() {
        let conn = Scripted::new("pgsql").on(
            "pg_tables",
            vec![Row::from_pairs([("tablename", "accounts")])],
        );
        let tables = SchemaIntrospector::list_tables(&conn, None).await.unwrap();
        assert_eq!(tables, vec!["accounts"]);
        assert!(conn.seen()[0].contains("schemaname = 'public'"));
    }

    #[tokio::test]
    async fn test_table_names_are_simple_quoted() {
        let conn = Scripted::new("sqlite");
        let err = SchemaIntrospector::list_columns(&conn, "o'brien", None)
            .await
            .unwrap_err();
        assert!(conn.seen()[0].contains("PRAGMA table_info('o''brien')"));
        match err {
            ExportError::SchemaIntrospection { table, dialect, .. } => {
                assert_eq!(table, "o'brien");
                assert_eq!(dialect, Dialect::Sqlite);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_driver_fails_fast() {
        let conn = Scripted::new("oracle");
        let err = SchemaIntrospector::list_tables(&conn, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedDriver { .. }));
        assert!(conn.seen().is_empty());
    }

    #[tokio::test]
    async fn test_cache_skips_second_catalog_round_trip() {
        let conn = Scripted::new("mysql").on(
            "DESCRIBE",
            vec![describe_row("id", "bigint", "NO", "PRI", "")],
        );
        let cache = SchemaCache::new();

        SchemaIntrospector::describe(&conn, "t", None, Some(&cache))
            .await
            .unwrap();
        let queries_after_first = conn.seen().len();
        SchemaIntrospector::describe(&conn, "t", None, Some(&cache))
            .await
            .unwrap();

        assert_eq!(conn.seen().len(), queries_after_first);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn test_effective_schema() {
        assert_eq!(
            effective_schema(Dialect::PgSql, None).as_deref(),
            Some("public")
        );
        assert_eq!(
            effective_schema(Dialect::PgSql, Some("  ")).as_deref(),
            Some("public")
        );
        assert_eq!(effective_schema(Dialect::MySql, None), None);
        assert_eq!(
            effective_schema(Dialect::SqlSrv, Some("dbo")).as_deref(),
            Some("dbo")
        );
    }
}
