//! Export requests, policies and per-table outcomes.

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_QUERY_SIZE};
use crate::error::{ExportError, ExportResult};
use crate::models::{Dialect, ExportScope};
use serde::{Deserialize, Serialize};

/// What to do when one table cannot be introspected or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first failing table.
    #[default]
    AbortOnError,
    /// Record the failure and move on to the next table.
    ContinueOnError,
}

/// Flush thresholds for batched `INSERT` statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub batch_size: usize,
    pub max_query_size: usize,
}

impl BatchLimits {
    /// Build limits from caller input; values below 1 are clamped to 1.
    pub fn new(batch_size: i64, max_query_size: i64) -> Self {
        Self {
            batch_size: positive(batch_size),
            max_query_size: positive(max_query_size),
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_query_size: DEFAULT_MAX_QUERY_SIZE,
        }
    }
}

fn positive(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0).max(1)
}

fn default_true() -> bool {
    true
}

/// A request to export tables from one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Tables to export. Empty means every table, referenced tables first.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Source schema (pgsql only; defaults to `public`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Dialect of the emitted SQL. Defaults to the source dialect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dialect: Option<Dialect>,
    #[serde(default = "default_true")]
    pub structure: bool,
    #[serde(default = "default_true")]
    pub data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_query_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            schema: None,
            target_dialect: None,
            structure: true,
            data: true,
            batch_size: None,
            max_query_size: None,
            file_name: None,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ExportRequest {
    /// Request covering the given tables with default settings.
    pub fn for_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn scope(&self) -> ExportResult<ExportScope> {
        ExportScope::from_flags(self.structure, self.data).ok_or_else(|| {
            ExportError::invalid_input("Nothing to export: both structure and data are disabled")
        })
    }

    pub fn batch_limits(&self) -> BatchLimits {
        let defaults = BatchLimits::default();
        BatchLimits::new(
            self.batch_size.unwrap_or(defaults.batch_size as i64),
            self.max_query_size
                .unwrap_or(defaults.max_query_size as i64),
        )
    }

    /// Resolve the export order against the catalog.
    ///
    /// With an explicit list the caller's order wins and names missing from
    /// the catalog come back in the second vector. Without one, every
    /// catalog table is selected in catalog order.
    pub fn select_tables(&self, available: &[String]) -> (Vec<String>, Vec<String>) {
        if self.tables.is_empty() {
            return (available.to_vec(), Vec::new());
        }

        let mut selected: Vec<String> = Vec::with_capacity(self.tables.len());
        let mut missing = Vec::new();
        for wanted in &self.tables {
            match available.iter().find(|t| same_table(wanted, t)) {
                Some(found) if !selected.contains(found) => selected.push(found.clone()),
                Some(_) => {}
                None => missing.push(wanted.trim().to_string()),
            }
        }
        (selected, missing)
    }
}

fn same_table(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Result of exporting one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Exported {
        table: String,
        rows: u64,
        statements: u64,
    },
    /// Requested, but not present in the catalog.
    Skipped { table: String, reason: String },
    /// Failed under [`ErrorPolicy::ContinueOnError`].
    Failed {
        table: String,
        dialect: Dialect,
        error: String,
    },
}

impl TableOutcome {
    pub fn table(&self) -> &str {
        match self {
            Self::Exported { table, .. } | Self::Skipped { table, .. } | Self::Failed { table, .. } => {
                table
            }
        }
    }
}

/// Tally of one export call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub outcomes: Vec<TableOutcome>,
    pub bytes_written: u64,
}

impl ExportReport {
    pub fn push(&mut self, outcome: TableOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn exported_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Exported { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed { .. }))
    }

    pub fn total_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TableOutcome::Exported { rows, .. } => *rows,
                _ => 0,
            })
            .sum()
    }

    /// A bulk export succeeds only when no table failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// JSON body returned to interactive callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }

    /// Path errors never echo the rejected path.
    pub fn from_error(error: &ExportError) -> Self {
        match error {
            ExportError::InvalidExportPath { .. } => Self::failure("Invalid file path."),
            e => Self::failure(e.to_string()),
        }
    }
}

impl<T> From<&ExportResult<T>> for ExportResponse {
    fn from(result: &ExportResult<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::from_error(e),
        }
    }
}
