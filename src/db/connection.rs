//! The connection seam between the export engine and a database.
//!
//! Everything above this module talks to a [`Connection`]: it runs a query
//! and yields rows one at a time, and reports its raw driver name. The
//! bundled implementation is [`DbPool`]; callers can plug in their own
//! (a SQL Server driver, a fixture) by implementing the trait.

use crate::db::pool::DbPool;
use crate::db::types::DecodeRow;
use crate::error::ExportResult;
use crate::models::{Dialect, Row};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::Executor;
use std::sync::Arc;

/// A source database handle.
pub trait Connection: Send + Sync {
    /// Raw driver identifier, e.g. `mysql`, `pgsql` or `mariadb`.
    fn driver_name(&self) -> &str;

    /// Execute `sql` and stream its rows in result order.
    fn fetch<'a>(&'a self, sql: &'a str) -> BoxStream<'a, ExportResult<Row>>;
}

/// Canonical dialect of a connection's driver.
pub fn dialect_of<C: Connection + ?Sized>(conn: &C) -> ExportResult<Dialect> {
    Dialect::normalize(conn.driver_name())
}

/// Execute `sql` and collect every row.
pub async fn fetch_all<C: Connection + ?Sized>(conn: &C, sql: &str) -> ExportResult<Vec<Row>> {
    conn.fetch(sql).try_collect().await
}

impl Connection for DbPool {
    fn driver_name(&self) -> &str {
        self.dialect().as_str()
    }

    fn fetch<'a>(&'a self, sql: &'a str) -> BoxStream<'a, ExportResult<Row>> {
        match self {
            DbPool::MySql(pool) => decode_stream(pool.fetch(sql)),
            DbPool::Postgres(pool) => decode_stream(pool.fetch(sql)),
            DbPool::SQLite(pool) => decode_stream(pool.fetch(sql)),
        }
    }
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn driver_name(&self) -> &str {
        (**self).driver_name()
    }

    fn fetch<'a>(&'a self, sql: &'a str) -> BoxStream<'a, ExportResult<Row>> {
        (**self).fetch(sql)
    }
}

/// Decode a driver row stream, sharing one column-name list across rows.
fn decode_stream<'a, R>(
    rows: BoxStream<'a, Result<R, sqlx::Error>>,
) -> BoxStream<'a, ExportResult<Row>>
where
    R: DecodeRow + Send + 'a,
{
    let mut columns: Option<Arc<[String]>> = None;
    rows.map(move |result| -> ExportResult<Row> {
        let row = result?;
        let decoded = row.to_export_row(columns.as_ref());
        if columns.is_none() {
            columns = Some(decoded.shared_columns());
        }
        Ok(decoded)
    })
    .boxed()
}
