//! Row streaming over a table.
//!
//! A [`TableQuery`] owns the `SELECT` text for one table (optionally one
//! page of it); a [`RowStreamer`] opens it against a connection and hands
//! back a [`RowSource`] that yields rows one at a time or in bounded
//! batches. Incremental mode never holds more than the current batch.

use crate::db::connection::{Connection, dialect_of, fetch_all};
use crate::db::schema::effective_schema;
use crate::error::{ExportError, ExportResult};
use crate::models::{Dialect, Row, RowBatch};
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How rows are pulled from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Materialize the whole result before the first pull.
    Eager,
    /// Pull one row from the driver per request.
    #[default]
    Incremental,
}

/// A window over a table's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// A page from optional bounds; `None` when neither is given.
    pub fn window(limit: Option<u64>, offset: Option<u64>) -> Option<Self> {
        if limit.is_none() && offset.is_none() {
            return None;
        }
        Some(Self {
            limit: limit.unwrap_or(i64::MAX as u64),
            offset: offset.unwrap_or(0),
        })
    }

    fn clause(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::SqlSrv => format!(
                " ORDER BY (SELECT NULL) OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                self.offset, self.limit
            ),
            _ => format!(" LIMIT {} OFFSET {}", self.limit, self.offset),
        }
    }
}

/// `SELECT *` over one table, rendered for the source dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    dialect: Dialect,
    table: String,
    schema: Option<String>,
    page: Option<Page>,
    sql: String,
}

impl TableQuery {
    pub fn new(dialect: Dialect, table: impl Into<String>, schema: Option<&str>) -> Self {
        let table = table.into();
        let schema = match dialect {
            Dialect::Sqlite => None,
            _ => effective_schema(dialect, schema),
        };
        let mut query = Self {
            dialect,
            table,
            schema,
            page: None,
            sql: String::new(),
        };
        query.render();
        query
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self.render();
        self
    }

    /// Like [`with_page`](Self::with_page), leaving the query whole on `None`.
    pub fn with_window(self, page: Option<Page>) -> Self {
        match page {
            Some(page) => self.with_page(page),
            None => self,
        }
    }

    fn render(&mut self) {
        let target = self
            .dialect
            .qualified_name(self.schema.as_deref(), &self.table);
        let mut sql = format!("SELECT * FROM {}", target);
        if let Some(page) = &self.page {
            sql.push_str(&page.clause(self.dialect));
        }
        self.sql = sql;
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// Opens table queries against one connection.
pub struct RowStreamer<'c, C: ?Sized> {
    conn: &'c C,
    mode: FetchMode,
    cancel: CancellationToken,
}

impl<'c, C: Connection + ?Sized> RowStreamer<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            mode: FetchMode::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checked before every pull; a cancelled token fails the pull.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the query for `table` in the connection's dialect.
    pub fn query(&self, table: &str, schema: Option<&str>) -> ExportResult<TableQuery> {
        Ok(TableQuery::new(dialect_of(self.conn)?, table, schema))
    }

    /// Start reading `query`.
    pub async fn open<'a>(&self, query: &'a TableQuery) -> ExportResult<RowSource<'a>>
    where
        'c: 'a,
    {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        debug!(table = %query.table, mode = ?self.mode, sql = %query.sql, "Opening row stream");

        let inner = match self.mode {
            FetchMode::Eager => {
                let rows = fetch_all(self.conn, &query.sql)
                    .await
                    .map_err(|e| e.for_table(&query.table, query.dialect))?;
                Inner::Eager(rows.into_iter())
            }
            FetchMode::Incremental => Inner::Incremental(self.conn.fetch(&query.sql)),
        };

        Ok(RowSource {
            inner,
            cancel: self.cancel.clone(),
            table: query.table.clone(),
            dialect: query.dialect,
            rows_read: 0,
        })
    }
}

enum Inner<'a> {
    Eager(std::vec::IntoIter<Row>),
    Incremental(BoxStream<'a, ExportResult<Row>>),
}

/// Pull interface shared by both fetch modes.
pub struct RowSource<'a> {
    inner: Inner<'a>,
    cancel: CancellationToken,
    table: String,
    dialect: Dialect,
    rows_read: u64,
}

impl RowSource<'_> {
    /// Next row, or `None` once the table is exhausted.
    pub async fn next_row(&mut self) -> ExportResult<Option<Row>> {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let next = match &mut self.inner {
            Inner::Eager(rows) => rows.next(),
            Inner::Incremental(stream) => match stream.next().await {
                Some(Ok(row)) => Some(row),
                Some(Err(e)) => return Err(e.for_table(&self.table, self.dialect)),
                None => None,
            },
        };
        if next.is_some() {
            self.rows_read += 1;
        }
        Ok(next)
    }

    /// Up to `max` rows; an empty batch means the table is exhausted.
    pub async fn next_batch(&mut self, max: usize) -> ExportResult<RowBatch> {
        let mut batch = Vec::with_capacity(max.min(1024));
        while batch.len() < max.max(1) {
            match self.next_row().await? {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        Ok(batch)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use futures_util::stream;
    use std::sync::Mutex;

    struct Numbers {
        count: i64,
        sql: Mutex<Vec<String>>,
    }

    impl Connection for Numbers {
        fn driver_name(&self) -> &str {
            "sqlite"
        }

        fn fetch<'a>(&'a self, sql: &'a str) -> BoxStream<'a, ExportResult<Row>> {
            self.sql.lock().unwrap().push(sql.to_string());
            stream::iter((0..self.count).map(|n| Ok(Row::from_pairs([("n", Value::Int(n))]))))
                .boxed()
        }
    }

    fn numbers(count: i64) -> Numbers {
        Numbers {
            count,
            sql: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_select_sql_per_dialect() {
        assert_eq!(
            TableQuery::new(Dialect::MySql, "users", None).sql(),
            "SELECT * FROM `users`"
        );
        assert_eq!(
            TableQuery::new(Dialect::PgSql, "users", None).sql(),
            "SELECT * FROM \"public\".\"users\""
        );
        assert_eq!(
            TableQuery::new(Dialect::Sqlite, "users", Some("main")).sql(),
            "SELECT * FROM \"users\""
        );
    }

    #[test]
    fn test_page_clause() {
        let page = Page::new(10, 20);
        assert_eq!(
            TableQuery::new(Dialect::Sqlite, "t", None)
                .with_page(page)
                .sql(),
            "SELECT * FROM \"t\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            TableQuery::new(Dialect::SqlSrv, "t", None)
                .with_page(page)
                .sql(),
            "SELECT * FROM [t] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(Page::window(None, None), None);
        assert_eq!(Page::window(Some(5), None), Some(Page::new(5, 0)));
        assert_eq!(
            TableQuery::new(Dialect::MySql, "t", None)
                .with_window(Page::window(None, Some(3)))
                .sql(),
            format!("SELECT * FROM `t` LIMIT {} OFFSET 3", i64::MAX)
        );
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let conn = numbers(250);
        let streamer = RowStreamer::new(&conn);
        let query = streamer.query("t", None).unwrap();
        let mut source = streamer.open(&query).await.unwrap();

        let mut sizes = Vec::new();
        loop {
            let batch = source.next_batch(100).await.unwrap();
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(source.rows_read(), 250);
    }

    #[tokio::test]
    async fn test_eager_and_incremental_yield_same_rows() {
        let conn = numbers(5);
        for mode in [FetchMode::Eager, FetchMode::Incremental] {
            let streamer = RowStreamer::new(&conn).with_mode(mode);
            let query = streamer.query("t", None).unwrap();
            let mut source = streamer.open(&query).await.unwrap();
            let mut seen = Vec::new();
            while let Some(row) = source.next_row().await.unwrap() {
                seen.push(row.text("n").unwrap());
            }
            assert_eq!(seen, vec!["0", "1", "2", "3", "4"]);
        }
    }

    #[tokio::test]
    async fn test_cancelled_pull_fails() {
        let conn = numbers(10);
        let token = CancellationToken::new();
        let streamer = RowStreamer::new(&conn).with_cancel(token.clone());
        let query = streamer.query("t", None).unwrap();
        let mut source = streamer.open(&query).await.unwrap();

        assert!(source.next_row().await.unwrap().is_some());
        token.cancel();
        assert!(matches!(
            source.next_row().await,
            Err(ExportError::Cancelled)
        ));
    }
}
