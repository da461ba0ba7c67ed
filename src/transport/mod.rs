//! Transport layer for interactive exports.
//!
//! The bulk subcommands write straight to files; the HTTP transport serves
//! the same exporters to browser and API clients.

pub mod http;

pub use http::{AppState, HttpTransport, router};

use crate::error::ExportResult;
use std::future::Future;

/// A long-running front end over the export engine.
pub trait Transport: Send + Sync {
    /// Start the transport and serve requests until shut down.
    fn run(&self) -> impl Future<Output = ExportResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
