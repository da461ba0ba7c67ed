//! CSV writer.
//!
//! Rows are written to a temporary file first, then copied to the caller's
//! output, and the temporary file is removed before the call returns.

use crate::db::stream::RowSource;
use crate::error::{ExportError, ExportResult};
use crate::export::Download;
use crate::export::spreadsheet::{HeaderFormat, RowTransform, title_case};
use crate::models::Value;
use std::fs::File;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

const READ_BATCH: usize = 500;

/// Single-table CSV export.
pub struct CsvWriter {
    temp: NamedTempFile,
    writer: csv::Writer<File>,
    rows: u64,
}

impl CsvWriter {
    pub fn new() -> ExportResult<Self> {
        let temp = tempfile::Builder::new()
            .prefix("db-export-")
            .suffix(".csv")
            .tempfile()?;
        let writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(temp.reopen()?);
        Ok(Self {
            temp,
            writer,
            rows: 0,
        })
    }

    /// Write `source` as CSV into `out`. Returns the number of data rows.
    ///
    /// Without a header the first row's column names (title-cased) form the
    /// header line; an empty source then produces an empty file.
    pub async fn write<W>(
        source: &mut RowSource<'_>,
        header: Option<&HeaderFormat>,
        transform: Option<&mut dyn RowTransform>,
        out: &mut W,
    ) -> ExportResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut writer = Self::new()?;
        writer.fill(source, header, transform).await?;
        writer.finish(out).await
    }

    /// Like [`write`](Self::write), collected into a download.
    pub async fn download(
        source: &mut RowSource<'_>,
        file_name: &str,
        header: Option<&HeaderFormat>,
        transform: Option<&mut dyn RowTransform>,
    ) -> ExportResult<Download> {
        let mut body = Vec::new();
        Self::write(source, header, transform, &mut body).await?;
        Ok(Download::new(file_name, CSV_CONTENT_TYPE, body))
    }

    async fn fill(
        &mut self,
        source: &mut RowSource<'_>,
        header: Option<&HeaderFormat>,
        mut transform: Option<&mut dyn RowTransform>,
    ) -> ExportResult<()> {
        if let Some(header) = header {
            self.writer.write_record(header.labels())?;
        }

        loop {
            let batch = source.next_batch(READ_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            for row in &batch {
                let index = self.rows as usize;
                let cells: Vec<Value> = match (header, transform.as_deref_mut()) {
                    (_, Some(t)) => t.transform(index, row),
                    (Some(header), None) => header
                        .labels()
                        .map(|label| row.get(label).cloned().unwrap_or(Value::Null))
                        .collect(),
                    (None, None) => {
                        if index == 0 {
                            self.writer
                                .write_record(row.columns().iter().map(|c| title_case(c)))?;
                        }
                        row.values().to_vec()
                    }
                };
                self.writer
                    .write_record(cells.iter().map(Value::to_text))?;
                self.rows += 1;
            }
        }
        Ok(())
    }

    /// Copy the temporary file to `out`, then delete it.
    async fn finish<W>(self, out: &mut W) -> ExportResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let Self {
            temp,
            mut writer,
            rows,
        } = self;
        writer.flush()?;
        drop(writer);

        let mut file = tokio::fs::File::open(temp.path()).await?;
        let bytes = tokio::io::copy(&mut file, out).await?;
        out.flush().await?;
        drop(file);

        let path = temp.path().to_path_buf();
        temp.close()
            .map_err(|e| ExportError::export_write(format!("{}: {}", path.display(), e)))?;
        debug!(rows, bytes, "Wrote CSV export");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::Connection;
    use crate::db::stream::RowStreamer;
    use crate::export::spreadsheet::ColumnFormat;
    use crate::models::Row;
    use futures_util::stream::{self, BoxStream, StreamExt};

    struct People;

    impl Connection for People {
        fn driver_name(&self) -> &str {
            "mysql"
        }

        fn fetch<'a>(&'a self, _sql: &'a str) -> BoxStream<'a, ExportResult<Row>> {
            let rows = vec![
                Row::from_pairs([("userName", Value::from("ann")), ("note", Value::from("a, \"b\""))]),
                Row::from_pairs([("userName", Value::from("bob")), ("note", Value::Null)]),
            ];
            stream::iter(rows.into_iter().map(Ok)).boxed()
        }
    }

    #[tokio::test]
    async fn test_unformatted_csv_quotes_fields() {
        let conn = People;
        let streamer = RowStreamer::new(&conn);
        let query = streamer.query("people", None).unwrap();
        let mut source = streamer.open(&query).await.unwrap();

        let mut out = Vec::new();
        let rows = CsvWriter::write(&mut source, None, None, &mut out).await.unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "User Name,Note\r\nann,\"a, \"\"b\"\"\"\r\nbob,\r\n"
        );
    }

    #[tokio::test]
    async fn test_formatted_csv_uses_header_order_and_transform() {
        let conn = People;
        let streamer = RowStreamer::new(&conn);
        let query = streamer.query("people", None).unwrap();
        let mut source = streamer.open(&query).await.unwrap();

        let header = HeaderFormat::new()
            .with("No", ColumnFormat::integer())
            .with("Name", ColumnFormat::string());
        let mut numbered = |index: usize, row: &Row| {
            vec![
                Value::Int(index as i64 + 1),
                row.get("userName").cloned().unwrap_or(Value::Null),
            ]
        };
        let transform: &mut dyn RowTransform = &mut numbered;
        let download = CsvWriter::download(&mut source, "people.csv", Some(&header), Some(transform))
            .await
            .unwrap();
        assert_eq!(download.content_type, "text/csv");
        assert_eq!(
            String::from_utf8(download.body).unwrap(),
            "No,Name\r\n1,ann\r\n2,bob\r\n"
        );
    }

    #[tokio::test]
    async fn test_temporary_file_is_removed() {
        let conn = People;
        let streamer = RowStreamer::new(&conn);
        let query = streamer.query("people", None).unwrap();
        let mut source = streamer.open(&query).await.unwrap();

        let mut writer = CsvWriter::new().unwrap();
        let path = writer.temp.path().to_path_buf();
        writer.fill(&mut source, None, None).await.unwrap();
        assert!(path.exists());
        writer.finish(&mut Vec::new()).await.unwrap();
        assert!(!path.exists());
    }
}
