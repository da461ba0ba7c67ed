//! Database export engine.
//!
//! Reads table structure and content from MySQL, PostgreSQL and SQLite
//! sources and writes them out as portable SQL dumps (for any of MySQL,
//! PostgreSQL, SQLite or SQL Server), XLSX workbooks or CSV files.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod transport;
pub mod typemap;

pub use config::Config;
pub use error::{ExportError, ExportResult};
