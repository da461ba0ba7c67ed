//! SQL dump generation.
//!
//! Structure and data are independent passes over the selected tables.
//! Data is read through a [`RowSource`] and written as batched `INSERT`
//! statements; a statement is flushed once it holds `batch_size` rows, and
//! a row that would push it past `max_query_size` bytes starts a new one.
//! Only a single row larger than the cap can produce an oversized statement.

use crate::db::connection::{Connection, dialect_of};
use crate::db::schema::{SchemaCache, SchemaIntrospector};
use crate::db::stream::{FetchMode, RowSource, RowStreamer};
use crate::error::{ExportError, ExportResult};
use crate::export::ddl::{ColumnKind, DdlWriter};
use crate::export::render::render_value;
use crate::export::{DOUBLE_NEW_LINE, NEW_LINE, target_table_name};
use crate::models::{
    BatchLimits, Dialect, ErrorPolicy, ExportReport, ExportRequest, ExportUnit, Row,
    TableDescriptor, TableOutcome,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STRUCTURE_HEADER: &str = "-- Database structure\r\n\r\n";
const CONTENT_HEADER: &str = "-- Database content\r\n";

/// Rows and statements emitted for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableTally {
    pub rows: u64,
    pub statements: u64,
}

impl TableTally {
    fn add(&mut self, other: TableTally) {
        self.rows += other.rows;
        self.statements += other.statements;
    }
}

/// Writes SQL dumps of one source connection.
pub struct SqlExporter<'c, C: ?Sized> {
    conn: &'c C,
    source: Dialect,
    cache: Option<&'c SchemaCache>,
    cancel: CancellationToken,
    fetch_mode: FetchMode,
}

impl<'c, C: Connection + ?Sized> SqlExporter<'c, C> {
    /// Fails with [`ExportError::UnsupportedDriver`] for unknown drivers.
    pub fn new(conn: &'c C) -> ExportResult<Self> {
        Ok(Self {
            conn,
            source: dialect_of(conn)?,
            cache: None,
            cancel: CancellationToken::new(),
            fetch_mode: FetchMode::Incremental,
        })
    }

    pub fn with_cache(mut self, cache: &'c SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    pub fn source(&self) -> Dialect {
        self.source
    }

    /// `CREATE TABLE` statements for `tables` (all tables when empty).
    pub async fn export_structure<W>(
        &self,
        tables: &[String],
        schema: Option<&str>,
        target: Option<Dialect>,
        out: &mut W,
    ) -> ExportResult<ExportReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let request = ExportRequest {
            tables: tables.to_vec(),
            schema: schema.map(str::to_string),
            target_dialect: target,
            structure: true,
            data: false,
            ..ExportRequest::default()
        };
        self.export(&request, out).await
    }

    /// Batched `INSERT` statements for `tables` (all tables when empty).
    pub async fn export_data<W>(
        &self,
        tables: &[String],
        schema: Option<&str>,
        target: Option<Dialect>,
        limits: BatchLimits,
        out: &mut W,
    ) -> ExportResult<ExportReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let request = ExportRequest {
            tables: tables.to_vec(),
            schema: schema.map(str::to_string),
            target_dialect: target,
            structure: false,
            data: true,
            batch_size: Some(limits.batch_size as i64),
            max_query_size: Some(limits.max_query_size as i64),
            ..ExportRequest::default()
        };
        self.export(&request, out).await
    }

    /// Full dump: a structure section, then a content section.
    ///
    /// Requested tables missing from the catalog are recorded as skipped.
    /// Per-table failures follow the request's [`ErrorPolicy`]; fatal errors
    /// always abort.
    pub async fn export<W>(&self, request: &ExportRequest, out: &mut W) -> ExportResult<ExportReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let scope = request.scope()?;
        let target = request.target_dialect.unwrap_or(self.source);
        let limits = request.batch_limits();
        let schema = request.schema.as_deref();
        let mut sink = Sink::new(out);
        let mut report = ExportReport::default();

        let available = SchemaIntrospector::list_tables(self.conn, schema).await?;
        let (mut tables, missing) = request.select_tables(&available);
        if request.tables.is_empty() {
            tables = self.dependency_order(tables, schema).await;
        }
        for table in missing {
            warn!(table = %table, dialect = %self.source, "Requested table not found, skipping");
            report.push(TableOutcome::Skipped {
                table,
                reason: "table not found".to_string(),
            });
        }

        let mut tallies: IndexMap<String, TableTally> =
            tables.iter().map(|t| (t.clone(), TableTally::default())).collect();
        let mut failed: HashMap<String, String> = HashMap::new();

        if scope.includes_structure() {
            sink.write(STRUCTURE_HEADER).await?;
            for table in &tables {
                let result = self
                    .write_structure(table, schema, target, &mut sink)
                    .await;
                self.settle(table, result, request.error_policy, &mut tallies, &mut failed)?;
            }
        }

        if scope.includes_data() {
            sink.write(CONTENT_HEADER).await?;
            let pending: Vec<String> = tables
                .iter()
                .filter(|t| !failed.contains_key(*t))
                .cloned()
                .collect();
            for table in &pending {
                let mut written = TableTally::default();
                let outcome = self
                    .write_data(table, schema, target, limits, &mut written, &mut sink)
                    .await;
                let result = outcome.map(|()| written);
                let partial = result.is_err() && written.statements > 0;
                self.settle(table, result, request.error_policy, &mut tallies, &mut failed)?;
                if partial {
                    sink.write(&format!(
                        "-- Export of `{}` failed after {} rows{}",
                        table, written.rows, DOUBLE_NEW_LINE
                    ))
                    .await?;
                }
            }
        }

        for (table, tally) in tallies {
            match failed.remove(&table) {
                Some(error) => report.push(TableOutcome::Failed {
                    table,
                    dialect: self.source,
                    error,
                }),
                None => report.push(TableOutcome::Exported {
                    table,
                    rows: tally.rows,
                    statements: tally.statements,
                }),
            }
        }
        report.bytes_written = sink.bytes;
        sink.flush().await?;

        info!(
            source = %self.source,
            target = %target,
            exported = report.exported_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            rows = report.total_rows(),
            bytes = report.bytes_written,
            "SQL export finished"
        );
        Ok(report)
    }

    /// Export one table with per-table section headers.
    ///
    /// Any failure aborts; the caller decides how to report it.
    pub async fn export_table<W>(
        &self,
        unit: &ExportUnit,
        limits: BatchLimits,
        out: &mut W,
    ) -> ExportResult<TableOutcome>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut sink = Sink::new(out);
        let mut tally = TableTally::default();
        let schema = unit.schema.as_deref();

        if unit.scope.includes_structure() {
            sink.write(&format!(
                "{}-- Database structure of `{}`{}",
                NEW_LINE, unit.table, NEW_LINE
            ))
            .await?;
            tally.add(
                self.write_structure(&unit.table, schema, unit.target, &mut sink)
                    .await?,
            );
        }
        if unit.scope.includes_data() {
            sink.write(&format!(
                "{}-- Database content of `{}`{}",
                NEW_LINE, unit.table, NEW_LINE
            ))
            .await?;
            let mut written = TableTally::default();
            self.write_data(&unit.table, schema, unit.target, limits, &mut written, &mut sink)
                .await?;
            tally.add(written);
        }
        sink.flush().await?;

        Ok(TableOutcome::Exported {
            table: unit.table.clone(),
            rows: tally.rows,
            statements: tally.statements,
        })
    }

    /// Record a per-table result, or return the error when it must abort.
    fn settle(
        &self,
        table: &str,
        result: ExportResult<TableTally>,
        policy: ErrorPolicy,
        tallies: &mut IndexMap<String, TableTally>,
        failed: &mut HashMap<String, String>,
    ) -> ExportResult<()> {
        match result {
            Ok(tally) => {
                if let Some(total) = tallies.get_mut(table) {
                    total.add(tally);
                }
                Ok(())
            }
            Err(e) if e.is_fatal() || policy == ErrorPolicy::AbortOnError => Err(e),
            Err(e) => {
                warn!(table = %table, dialect = %self.source, error = %e, "Table export failed, continuing");
                failed.insert(table.to_string(), e.to_string());
                Ok(())
            }
        }
    }

    async fn describe(&self, table: &str, schema: Option<&str>) -> ExportResult<TableDescriptor> {
        SchemaIntrospector::describe(self.conn, table, schema, self.cache).await
    }

    /// Reorder catalog tables so referenced tables come before the tables
    /// that reference them.
    ///
    /// Tables that cannot be described keep their place; their failure is
    /// reported by the pass that needs them.
    async fn dependency_order(&self, tables: Vec<String>, schema: Option<&str>) -> Vec<String> {
        let mut references: HashMap<String, Vec<String>> = HashMap::new();
        for table in &tables {
            match self.describe(table, schema).await {
                Ok(descriptor) => {
                    let parents = descriptor
                        .foreign_keys
                        .into_iter()
                        .map(|fk| fk.referenced_table)
                        .collect();
                    references.insert(table.clone(), parents);
                }
                Err(e) => {
                    debug!(table = %table, error = %e, "No dependency information");
                }
            }
        }
        order_by_references(tables, &references)
    }

    async fn write_structure<W>(
        &self,
        table: &str,
        schema: Option<&str>,
        target: Dialect,
        sink: &mut Sink<'_, W>,
    ) -> ExportResult<TableTally>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let descriptor = self.describe(table, schema).await?;
        let name = target_table_name(self.source, target, schema, table);
        let create = DdlWriter::new(self.source, target).create_table(&descriptor, &name);

        sink.write(&create).await?;
        sink.write(DOUBLE_NEW_LINE).await?;
        debug!(table = %table, target = %target, "Wrote table structure");
        Ok(TableTally {
            rows: 0,
            statements: 1,
        })
    }

    async fn write_data<W>(
        &self,
        table: &str,
        schema: Option<&str>,
        target: Dialect,
        limits: BatchLimits,
        tally: &mut TableTally,
        sink: &mut Sink<'_, W>,
    ) -> ExportResult<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let descriptor = self.describe(table, schema).await?;
        let kinds: HashMap<&str, ColumnKind> = descriptor
            .columns
            .values()
            .map(|c| (c.name.as_str(), ColumnKind::parse(&c.native_type)))
            .collect();

        let streamer = RowStreamer::new(self.conn)
            .with_mode(self.fetch_mode)
            .with_cancel(self.cancel.clone());
        let query = streamer.query(table, schema)?;
        let mut rows: RowSource<'_> = streamer.open(&query).await?;

        let name = target_table_name(self.source, target, schema, table);
        let mut batch: Option<InsertBatch> = None;

        while let Some(row) = rows.next_row().await? {
            let batch = batch.get_or_insert_with(|| InsertBatch::new(&name, &row, target, limits));
            let tuple = value_tuple(&row, &kinds, target);

            if batch.would_overflow(&tuple) {
                self.flush(table, batch, sink, tally, true).await?;
            }
            batch.push(tuple);
            if batch.is_full() {
                self.flush(table, batch, sink, tally, true).await?;
            }
        }

        if let Some(batch) = batch.as_mut() {
            self.flush(table, batch, sink, tally, false).await?;
        }
        if tally.rows > 0 {
            sink.write(NEW_LINE).await?;
        }
        debug!(table = %table, rows = tally.rows, statements = tally.statements, "Wrote table data");
        Ok(())
    }

    async fn flush<W>(
        &self,
        table: &str,
        batch: &mut InsertBatch,
        sink: &mut Sink<'_, W>,
        tally: &mut TableTally,
        trailing_newline: bool,
    ) -> ExportResult<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let rows = batch.len() as u64;
        let Some(statement) = batch.take() else {
            return Ok(());
        };
        debug!(table = %table, bytes = statement.len(), "Flushing INSERT batch");
        sink.write(&statement).await?;
        if trailing_newline {
            sink.write(NEW_LINE).await?;
        }
        tally.rows += rows;
        tally.statements += 1;
        Ok(())
    }
}

/// Stable topological order: a table follows every table it references.
///
/// Self references are ignored and a cycle keeps the remaining tables in
/// their given order.
fn order_by_references(
    tables: Vec<String>,
    references: &HashMap<String, Vec<String>>,
) -> Vec<String> {
    let mut remaining = tables;
    let mut ordered: Vec<String> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|table| {
            references.get(table).is_none_or(|parents| {
                parents.iter().all(|parent| {
                    parent == table
                        || ordered.contains(parent)
                        || !remaining.contains(parent)
                })
            })
        });
        let next = remaining.remove(ready.unwrap_or(0));
        ordered.push(next);
    }
    ordered
}

/// `(v1, v2, ...)` for one row, coerced to the target column kinds.
fn value_tuple(row: &Row, kinds: &HashMap<&str, ColumnKind>, target: Dialect) -> String {
    let values: Vec<String> = row
        .iter()
        .map(|(column, value)| render_value(value, kinds.get(column).copied(), target))
        .collect();
    format!("({})", values.join(", "))
}

const VALUES_SEPARATOR: &str = ", \r\n";
const STATEMENT_END: &str = "\r\n;\r\n";

/// One `INSERT` statement being accumulated.
struct InsertBatch {
    head: String,
    values: Vec<String>,
    /// Bytes of the statement if it were rendered now.
    size: usize,
    limits: BatchLimits,
}

impl InsertBatch {
    fn new(table: &str, first: &Row, target: Dialect, limits: BatchLimits) -> Self {
        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|c| target.quote_identifier(c))
            .collect();
        let head = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            NEW_LINE
        );
        let size = head.len() + STATEMENT_END.len();
        Self {
            head,
            values: Vec::new(),
            size,
            limits,
        }
    }

    fn added_size(&self, tuple: &str) -> usize {
        let separator = if self.values.is_empty() {
            0
        } else {
            VALUES_SEPARATOR.len()
        };
        self.size + separator + tuple.len()
    }

    /// Adding `tuple` would exceed the byte cap of a non-empty statement.
    fn would_overflow(&self, tuple: &str) -> bool {
        !self.values.is_empty() && self.added_size(tuple) > self.limits.max_query_size
    }

    fn push(&mut self, tuple: String) {
        self.size = self.added_size(&tuple);
        self.values.push(tuple);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_full(&self) -> bool {
        self.values.len() >= self.limits.batch_size
    }

    fn take(&mut self) -> Option<String> {
        if self.values.is_empty() {
            return None;
        }
        let mut statement = String::with_capacity(self.size);
        statement.push_str(&self.head);
        statement.push_str(&self.values.join(VALUES_SEPARATOR));
        statement.push_str(STATEMENT_END);
        self.values.clear();
        self.size = self.head.len() + STATEMENT_END.len();
        Some(statement)
    }
}

/// Counting writer over the caller's output.
struct Sink<'w, W: ?Sized> {
    out: &'w mut W,
    bytes: u64,
}

impl<'w, W: AsyncWrite + Unpin + Send + ?Sized> Sink<'w, W> {
    fn new(out: &'w mut W) -> Self {
        Self { out, bytes: 0 }
    }

    async fn write(&mut self, text: &str) -> ExportResult<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.bytes += text.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> ExportResult<()> {
        self.out.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn row(id: i64, name: &str) -> Row {
        Row::from_pairs([("id", Value::Int(id)), ("name", Value::from(name))])
    }

    #[test]
    fn test_insert_batch_layout() {
        let limits = BatchLimits::new(100, 524_288);
        let mut batch = InsertBatch::new("`t`", &row(1, "a"), Dialect::MySql, limits);
        batch.push("(1, 'a')".into());
        batch.push("(2, 'b')".into());
        let statement = batch.take().unwrap();
        assert_eq!(
            statement,
            "INSERT INTO `t` (`id`, `name`) VALUES \r\n(1, 'a'), \r\n(2, 'b')\r\n;\r\n"
        );
        assert!(batch.take().is_none());
    }

    #[test]
    fn test_size_tracking_matches_rendered_statement() {
        let limits = BatchLimits::new(100, 524_288);
        let mut batch = InsertBatch::new("\"t\"", &row(1, "a"), Dialect::Sqlite, limits);
        for i in 0..7 {
            batch.push(format!("({}, 'row-{}')", i, i));
        }
        let expected = batch.size;
        assert_eq!(batch.take().unwrap().len(), expected);
    }

    #[test]
    fn test_oversize_single_row_still_accepted() {
        let limits = BatchLimits::new(100, 10);
        let mut batch = InsertBatch::new("`t`", &row(1, "a"), Dialect::MySql, limits);
        let big = format!("('{}')", "x".repeat(64));
        assert!(!batch.would_overflow(&big));
        batch.push(big.clone());
        assert!(batch.would_overflow(&big));
    }

    fn refs(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(t, parents)| (t.to_string(), parents.iter().map(|p| p.to_string()).collect()))
            .collect()
    }

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let references = refs(&[
            ("order_items", &["orders", "products"]),
            ("orders", &["users"]),
            ("users", &[]),
        ]);
        let ordered = order_by_references(
            names(&["order_items", "orders", "products", "users"]),
            &references,
        );
        assert_eq!(ordered, names(&["products", "users", "orders", "order_items"]));
    }

    #[test]
    fn test_reference_order_tolerates_cycles_and_self_references() {
        let references = refs(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("tree", &["tree"]),
            ("c", &["missing"]),
        ]);
        let ordered = order_by_references(names(&["a", "b", "tree", "c"]), &references);
        assert_eq!(ordered, names(&["tree", "c", "a", "b"]));
    }

    #[test]
    fn test_value_tuple_uses_column_kinds() {
        let mut kinds = HashMap::new();
        kinds.insert("flag", ColumnKind::Boolean);
        let row = Row::from_pairs([("flag", Value::Int(1)), ("note", Value::from("it's"))]);
        assert_eq!(
            value_tuple(&row, &kinds, Dialect::PgSql),
            "(TRUE, 'it''s')"
        );
    }
}
