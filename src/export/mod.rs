//! Artifact writers.
//!
//! - `sql`: `CREATE TABLE` and batched `INSERT` dumps
//! - `spreadsheet`: XLSX workbooks, one sheet per table
//! - `csv`: single-table CSV through a temporary file
//! - `ddl` / `render`: per-dialect type and literal rendering
//! - `path`: export file name safety

pub mod csv;
pub mod ddl;
pub mod path;
pub mod render;
pub mod spreadsheet;
pub mod sql;

pub use self::csv::{CSV_CONTENT_TYPE, CsvWriter};
pub use ddl::{ColumnKind, DdlWriter};
pub use path::{resolve_export_path, sanitize_file_name};
pub use spreadsheet::{
    ColumnFormat, DatabaseXlsxExporter, HeaderFormat, RowTransform, SheetWriter,
    XLSX_CONTENT_TYPE, title_case,
};
pub use sql::SqlExporter;

use crate::db::schema::effective_schema;
use crate::models::Dialect;

pub const NEW_LINE: &str = "\r\n";
pub const DOUBLE_NEW_LINE: &str = "\r\n\r\n";
pub const TAB: &str = "\t";

/// A finished artifact ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Download {
    pub fn new(file_name: impl Into<String>, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            body,
        }
    }

    /// Response headers for a binary attachment.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "Content-Disposition",
                format!(
                    "attachment; filename=\"{}\"",
                    self.file_name.replace(['"', '\r', '\n'], "_")
                ),
            ),
            ("Content-Type", self.content_type.to_string()),
            ("Content-Transfer-Encoding", "binary".to_string()),
            ("Cache-Control", "must-revalidate".to_string()),
            ("Pragma", "public".to_string()),
        ]
    }
}

/// Quoted table name for statements emitted into `target`.
///
/// The source schema is kept only when exporting back into the same
/// schema-aware dialect (pgsql, sqlsrv); anywhere else the dump targets
/// whatever database it is loaded into.
pub fn target_table_name(
    source: Dialect,
    target: Dialect,
    schema: Option<&str>,
    table: &str,
) -> String {
    let schema = match (source, target) {
        (Dialect::PgSql, Dialect::PgSql) | (Dialect::SqlSrv, Dialect::SqlSrv) => {
            effective_schema(source, schema)
        }
        _ => None,
    };
    target.qualified_name(schema.as_deref(), table)
}
