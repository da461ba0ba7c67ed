//! Database access layer.
//!
//! - `connection`: the [`Connection`] seam every exporter reads through
//! - `pool`: sqlx pools for the bundled drivers
//! - `schema`: catalog introspection and the per-run schema cache
//! - `stream`: full-table row streaming
//! - `types`: sqlx row decoding

pub mod connection;
pub mod pool;
pub mod schema;
pub mod stream;
pub mod types;

pub use connection::{Connection, dialect_of, fetch_all};
pub use pool::{ConnectionManager, DbPool};
pub use schema::{SchemaCache, SchemaIntrospector, effective_schema};
pub use stream::{FetchMode, Page, RowSource, RowStreamer, TableQuery};
