//! Error types for the database exporter.
//!
//! Every failure an export can hit is an [`ExportError`] variant. Messages
//! carry the table, dialect and raw driver message so a failed table can be
//! diagnosed from the log line or the JSON response alone.

use crate::models::Dialect;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported or unknown database driver: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("Schema introspection failed for table '{table}' ({dialect}): {message}")]
    SchemaIntrospection {
        table: String,
        dialect: Dialect,
        message: String,
    },

    #[error("Export write failed: {message}")]
    ExportWrite { message: String },

    #[error("Invalid file path: {path} ({reason})")]
    InvalidExportPath { path: String, reason: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ExportError {
    /// Create an unsupported driver error.
    pub fn unsupported_driver(driver: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            driver: driver.into(),
        }
    }

    /// Create a schema introspection error for a table.
    pub fn schema_introspection(
        table: impl Into<String>,
        dialect: Dialect,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaIntrospection {
            table: table.into(),
            dialect,
            message: message.into(),
        }
    }

    /// Create an export write error.
    pub fn export_write(message: impl Into<String>) -> Self {
        Self::ExportWrite {
            message: message.into(),
        }
    }

    /// Create an invalid export path error.
    pub fn invalid_export_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExportPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Errors that end the whole export regardless of the error policy.
    ///
    /// A broken sink leaves the artifact corrupt, and a bad driver or path
    /// means nothing can be exported at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDriver { .. }
                | Self::ExportWrite { .. }
                | Self::InvalidExportPath { .. }
                | Self::Connection { .. }
                | Self::Cancelled
        )
    }

    /// Attach table and dialect context to a per-table failure.
    ///
    /// Errors that already name their table, and fatal errors, pass through.
    pub fn for_table(self, table: &str, dialect: Dialect) -> Self {
        match self {
            Self::Query { message, .. } | Self::Internal { message } => {
                Self::schema_introspection(table, dialect, message)
            }
            other => other,
        }
    }
}

/// Convert sqlx errors to ExportError.
impl From<sqlx::Error> for ExportError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ExportError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ExportError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => ExportError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => ExportError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                ExportError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => ExportError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ExportError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ExportError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                ExportError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                ExportError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                ExportError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => ExportError::internal("Database worker crashed"),
            _ => ExportError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::export_write(err.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::export_write(format!("CSV: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::export_write(format!("XLSX: {}", err))
    }
}

/// Result type alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_driver_display() {
        let err = ExportError::unsupported_driver("oracle");
        assert_eq!(
            err.to_string(),
            "Unsupported or unknown database driver: oracle"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_schema_error_carries_context() {
        let err = ExportError::schema_introspection("users", Dialect::PgSql, "relation missing");
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("pgsql"));
        assert!(msg.contains("relation missing"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_error_maps_to_export_write() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ExportError = io.into();
        assert!(matches!(err, ExportError::ExportWrite { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_for_table_wraps_query_errors() {
        let err = ExportError::query("no such table: ghost", None).for_table("ghost", Dialect::Sqlite);
        match err {
            ExportError::SchemaIntrospection { table, dialect, .. } => {
                assert_eq!(table, "ghost");
                assert_eq!(dialect, Dialect::Sqlite);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_for_table_keeps_fatal_errors() {
        let err = ExportError::export_write("disk full").for_table("t", Dialect::MySql);
        assert!(matches!(err, ExportError::ExportWrite { .. }));
    }

    #[test]
    fn test_connection_suggestion() {
        let err = ExportError::connection("refused", "Start the server");
        assert_eq!(err.suggestion(), Some("Start the server"));
        assert_eq!(ExportError::Cancelled.suggestion(), None);
    }
}
