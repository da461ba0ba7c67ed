//! Data models for the exporter.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod dialect;
pub mod request;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionSummary};
pub use dialect::Dialect;
pub use request::{
    BatchLimits, ErrorPolicy, ExportReport, ExportRequest, ExportResponse, TableOutcome,
};
pub use table::{ColumnInfo, ExportScope, ExportUnit, ForeignKey, TableDescriptor};
pub use value::{Row, RowBatch, Value};
