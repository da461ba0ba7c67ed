//! XLSX workbook writer.
//!
//! Two modes share one entry point:
//!
//! - unformatted: the header comes from the first row's column names
//!   (title-cased) and every cell is written as a string;
//! - formatted: an explicit, ordered [`HeaderFormat`] names each column and
//!   its logical type, and an optional [`RowTransform`] maps each raw row to
//!   its cells.
//!
//! [`DatabaseXlsxExporter`] writes every table of a connection into one
//! workbook, one sheet per table.

use crate::db::connection::Connection;
use crate::db::schema::{SchemaCache, SchemaIntrospector};
use crate::db::stream::{RowSource, RowStreamer};
use crate::error::ExportResult;
use crate::export::Download;
use crate::models::{Row, TableDescriptor, Value};
use crate::typemap::LogicalType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use indexmap::IndexMap;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Excel's sheet name limit.
const MAX_SHEET_NAME_LEN: usize = 31;
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
/// Rows pulled per round trip before they are written to the sheet.
const WRITE_BATCH: usize = 500;
/// Excel's cell text limit, in characters.
const MAX_CELL_CHARS: usize = 32_767;

/// Logical type of one column plus an optional decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFormat {
    pub logical: LogicalType,
    pub precision: Option<usize>,
}

impl ColumnFormat {
    pub fn new(logical: LogicalType) -> Self {
        Self {
            logical,
            precision: None,
        }
    }

    pub fn string() -> Self {
        Self::new(LogicalType::String)
    }

    pub fn integer() -> Self {
        Self::new(LogicalType::Integer)
    }

    /// Double shown with `precision` digits, `#,##0` style.
    pub fn double(precision: usize) -> Self {
        Self {
            logical: LogicalType::Double,
            precision: Some(precision),
        }
    }

    fn format(&self) -> Option<Format> {
        self.logical
            .cell_format(self.precision)
            .map(|num| Format::new().set_num_format(num))
    }
}

/// Ordered header label → column format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderFormat {
    columns: IndexMap<String, ColumnFormat>,
}

impl HeaderFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, format: ColumnFormat) -> Self {
        self.columns.insert(label.into(), format);
        self
    }

    /// One column per table column, labelled with the raw column name.
    pub fn from_descriptor(table: &TableDescriptor) -> Self {
        Self {
            columns: table
                .logical_types()
                .map(|(name, logical)| (name.to_string(), ColumnFormat::new(logical)))
                .collect(),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn formats(&self) -> impl Iterator<Item = &ColumnFormat> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Maps a raw row to the cells of one sheet row.
pub trait RowTransform: Send {
    fn transform(&mut self, index: usize, row: &Row) -> Vec<Value>;
}

impl<F> RowTransform for F
where
    F: FnMut(usize, &Row) -> Vec<Value> + Send,
{
    fn transform(&mut self, index: usize, row: &Row) -> Vec<Value> {
        self(index, row)
    }
}

/// `userName` / `user_name` → `User Name`.
pub fn title_case(key: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in key.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            let boundary = c.is_uppercase()
                && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Make `raw` a valid, unused sheet name.
///
/// Excel compares names case-insensitively, so `used` holds lowercase names.
fn unique_sheet_name(raw: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base = if cleaned.is_empty() { "Sheet" } else { cleaned };

    let mut candidate = truncate_chars(base, MAX_SHEET_NAME_LEN);
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!(" ({})", n);
        candidate = format!(
            "{}{}",
            truncate_chars(base, MAX_SHEET_NAME_LEN - suffix.chars().count()),
            suffix
        );
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Days since 1899-12-30, the Excel epoch (fraction is the time of day).
fn excel_serial(dt: NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN);
    let delta = dt - epoch;
    delta.num_milliseconds() as f64 / 86_400_000.0
}

fn time_fraction(t: NaiveTime) -> f64 {
    (t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9) / 86_400.0
}

/// Numeric value Excel stores for a temporal cell.
fn temporal_serial(value: &Value, logical: LogicalType) -> Option<f64> {
    match value {
        Value::DateTime(dt) => Some(excel_serial(*dt)),
        Value::Timestamp(ts) => Some(excel_serial(ts.naive_utc())),
        Value::Date(d) => Some(excel_serial(d.and_time(NaiveTime::MIN))),
        Value::Time(t) => Some(time_fraction(*t)),
        Value::Text(s) => {
            let s = s.trim();
            match logical {
                LogicalType::Time => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .ok()
                    .map(time_fraction),
                LogicalType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .map(|d| excel_serial(d.and_time(NaiveTime::MIN))),
                _ => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                    .ok()
                    .map(excel_serial),
            }
        }
        _ => None,
    }
}

/// Cell text clipped to what Excel can store.
fn cell_text(value: &Value, sheet: &Worksheet, row: u32, col: u16) -> String {
    let text = value.to_text();
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(
                sheet = %sheet.name(),
                row,
                col,
                chars = text.chars().count(),
                "Cell text exceeds the Excel limit, truncating"
            );
            text[..cut].to_string()
        }
        None => text,
    }
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    format: Option<(&ColumnFormat, Option<&Format>)>,
) -> ExportResult<()> {
    if value.is_null() {
        return Ok(());
    }
    let Some((column, num_format)) = format else {
        let text = cell_text(value, sheet, row, col);
        sheet.write_string(row, col, text)?;
        return Ok(());
    };

    let number = match column.logical {
        LogicalType::Integer | LogicalType::Double => value.as_f64(),
        LogicalType::DateTime | LogicalType::Date | LogicalType::Time => {
            temporal_serial(value, column.logical)
        }
        LogicalType::String => None,
    };
    match (number, num_format) {
        (Some(n), Some(f)) => {
            sheet.write_number_with_format(row, col, n, f)?;
        }
        (Some(n), None) => {
            sheet.write_number(row, col, n)?;
        }
        (None, _) => {
            let text = cell_text(value, sheet, row, col);
            sheet.write_string(row, col, text)?;
        }
    }
    Ok(())
}

/// Accumulates sheets into one workbook.
pub struct SheetWriter {
    workbook: Workbook,
    used_names: HashSet<String>,
    header_format: Format,
}

impl Default for SheetWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetWriter {
    pub fn new() -> Self {
        Self {
            workbook: Workbook::new(),
            used_names: HashSet::new(),
            header_format: Format::new().set_bold(),
        }
    }

    /// Single-sheet export of `source`, ready to send as a download.
    pub async fn write(
        source: &mut RowSource<'_>,
        file_name: &str,
        sheet_name: &str,
        header: Option<&HeaderFormat>,
        transform: Option<&mut dyn RowTransform>,
    ) -> ExportResult<Download> {
        let mut writer = Self::new();
        writer.add_sheet(source, sheet_name, header, transform).await?;
        Ok(Download::new(
            file_name,
            XLSX_CONTENT_TYPE,
            writer.save_to_buffer()?,
        ))
    }

    /// Append one sheet filled from `source`. Returns the row count.
    ///
    /// With a header and no transform, cells are looked up by header label.
    pub async fn add_sheet(
        &mut self,
        source: &mut RowSource<'_>,
        sheet_name: &str,
        header: Option<&HeaderFormat>,
        mut transform: Option<&mut dyn RowTransform>,
    ) -> ExportResult<u64> {
        let name = unique_sheet_name(sheet_name, &mut self.used_names);
        let mut sheet = Worksheet::new();
        sheet.set_name(&name)?;

        let formats: Option<Vec<(ColumnFormat, Option<Format>)>> =
            header.map(|h| h.formats().map(|f| (*f, f.format())).collect());
        if let Some(header) = header {
            self.write_header(&mut sheet, header.labels())?;
        }

        let mut written: u64 = 0;
        loop {
            let batch = source.next_batch(WRITE_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            for raw in &batch {
                let index = written as usize;
                let excel_row = u32::try_from(written + 1).unwrap_or(u32::MAX);

                match (&formats, header) {
                    (Some(formats), Some(header)) => {
                        let cells: Vec<Value> = match transform.as_deref_mut() {
                            Some(t) => t.transform(index, raw),
                            None => header
                                .labels()
                                .map(|label| raw.get(label).cloned().unwrap_or(Value::Null))
                                .collect(),
                        };
                        for (col, (cell, (column, num))) in cells.iter().zip(formats).enumerate() {
                            write_cell(
                                &mut sheet,
                                excel_row,
                                col as u16,
                                cell,
                                Some((column, num.as_ref())),
                            )?;
                        }
                    }
                    _ => {
                        if written == 0 {
                            let labels: Vec<String> =
                                raw.columns().iter().map(|c| title_case(c)).collect();
                            self.write_header(&mut sheet, labels.iter().map(String::as_str))?;
                        }
                        for (col, (_, value)) in raw.iter().enumerate() {
                            write_cell(&mut sheet, excel_row, col as u16, value, None)?;
                        }
                    }
                }
                written += 1;
            }
        }

        self.workbook.push_worksheet(sheet);
        debug!(sheet = %name, rows = written, "Wrote worksheet");
        Ok(written)
    }

    fn write_header<'a>(
        &self,
        sheet: &mut Worksheet,
        labels: impl Iterator<Item = &'a str>,
    ) -> ExportResult<()> {
        for (col, label) in labels.enumerate() {
            sheet.write_string_with_format(0, col as u16, label, &self.header_format)?;
        }
        Ok(())
    }

    pub fn sheet_count(&self) -> usize {
        self.used_names.len()
    }

    pub fn save_to_buffer(&mut self) -> ExportResult<Vec<u8>> {
        if self.used_names.is_empty() {
            // An empty workbook is not a valid xlsx file.
            self.workbook.add_worksheet();
        }
        Ok(self.workbook.save_to_buffer()?)
    }
}

/// Whole-connection workbook export, one sheet per table.
pub struct DatabaseXlsxExporter<'c, C: ?Sized> {
    conn: &'c C,
    sheet_prefix: String,
    schema: Option<String>,
    cache: Option<&'c SchemaCache>,
    cancel: CancellationToken,
}

impl<'c, C: Connection + ?Sized> DatabaseXlsxExporter<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self {
            conn,
            sheet_prefix: String::new(),
            schema: None,
            cache: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sheet_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sheet_prefix = prefix.into();
        self
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_cache(mut self, cache: &'c SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Export `tables` (every table when empty) into one workbook.
    pub async fn export(&self, tables: &[String], file_name: &str) -> ExportResult<Download> {
        let schema = self.schema.as_deref();
        let tables = if tables.is_empty() {
            SchemaIntrospector::list_tables(self.conn, schema).await?
        } else {
            tables.to_vec()
        };

        let mut writer = SheetWriter::new();
        let mut total_rows = 0u64;
        for table in &tables {
            let descriptor =
                SchemaIntrospector::describe(self.conn, table, schema, self.cache).await?;
            let header = HeaderFormat::from_descriptor(&descriptor);

            let streamer = RowStreamer::new(self.conn).with_cancel(self.cancel.clone());
            let query = streamer.query(table, schema)?;
            let mut source = streamer.open(&query).await?;
            let sheet_name = format!("{}{}", self.sheet_prefix, table);
            total_rows += writer
                .add_sheet(&mut source, &sheet_name, Some(&header), None)
                .await?;
        }

        info!(
            sheets = writer.sheet_count(),
            rows = total_rows,
            file = %file_name,
            "Workbook export finished"
        );
        Ok(Download::new(
            file_name,
            XLSX_CONTENT_TYPE,
            writer.save_to_buffer()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("userName"), "User Name");
        assert_eq!(title_case("user_name"), "User Name");
        assert_eq!(title_case("id"), "Id");
        assert_eq!(title_case("timeCreate2"), "Time Create2");
        assert_eq!(title_case("address2Line"), "Address2 Line");
    }

    #[test]
    fn test_sheet_names_are_valid_and_distinct() {
        let mut used = HashSet::new();
        assert_eq!(unique_sheet_name("orders", &mut used), "orders");
        assert_eq!(unique_sheet_name("Orders", &mut used), "Orders (2)");
        assert_eq!(unique_sheet_name("a/b:c", &mut used), "a_b_c");

        let long = "x".repeat(40);
        let first = unique_sheet_name(&long, &mut used);
        let second = unique_sheet_name(&long, &mut used);
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with(" (2)"));
        assert_ne!(first, second);

        assert_eq!(unique_sheet_name("''", &mut used), "Sheet");
    }

    #[test]
    fn test_header_format_keeps_order() {
        let header = HeaderFormat::new()
            .with("No", ColumnFormat::integer())
            .with("Name", ColumnFormat::string())
            .with("Amount", ColumnFormat::double(2));
        let labels: Vec<_> = header.labels().collect();
        assert_eq!(labels, ["No", "Name", "Amount"]);
    }

    #[test]
    fn test_excel_serial_dates() {
        let d = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap();
        assert_eq!(excel_serial(d.and_time(NaiveTime::MIN)), 61.0);
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert_eq!(time_fraction(noon), 0.5);
        assert_eq!(
            temporal_serial(&Value::Text("2024-01-01".into()), LogicalType::Date),
            Some(45292.0)
        );
    }

    struct Notes;

    impl Connection for Notes {
        fn driver_name(&self) -> &str {
            "sqlite"
        }

        fn fetch<'a>(&'a self, _sql: &'a str) -> futures_util::stream::BoxStream<'a, ExportResult<Row>> {
            use futures_util::stream::{self, StreamExt};
            let long = "é".repeat(MAX_CELL_CHARS + 5_000);
            let rows = vec![Row::from_pairs([("id", Value::Int(1)), ("body", Value::Text(long))])];
            stream::iter(rows.into_iter().map(Ok)).boxed()
        }
    }

    #[test]
    fn test_cell_text_is_clipped_to_excel_limit() {
        let sheet = Worksheet::new();
        let long = Value::Text("é".repeat(MAX_CELL_CHARS + 1));
        let clipped = cell_text(&long, &sheet, 1, 0);
        assert_eq!(clipped.chars().count(), MAX_CELL_CHARS);

        let short = Value::Text("ok".into());
        assert_eq!(cell_text(&short, &sheet, 1, 0), "ok");
    }

    #[tokio::test]
    async fn test_oversize_text_does_not_abort_workbook() {
        let conn = Notes;
        let streamer = RowStreamer::new(&conn);
        let query = streamer.query("notes", None).unwrap();

        let mut source = streamer.open(&query).await.unwrap();
        let plain = SheetWriter::write(&mut source, "notes.xlsx", "notes", None, None)
            .await
            .unwrap();
        assert!(plain.body.starts_with(b"PK"));

        let mut source = streamer.open(&query).await.unwrap();
        let header = HeaderFormat::new()
            .with("id", ColumnFormat::integer())
            .with("body", ColumnFormat::string());
        let formatted = SheetWriter::write(&mut source, "notes.xlsx", "notes", Some(&header), None)
            .await
            .unwrap();
        assert!(formatted.body.starts_with(b"PK"));
    }
}
