//! Export file name sanitization and directory containment.

use crate::error::{ExportError, ExportResult};
use std::path::{Path, PathBuf};

const SQL_SUFFIX: &str = ".sql";

/// Reduce a caller-supplied file name to a safe `.sql` basename.
///
/// Every character outside `[A-Za-z0-9_.-]` becomes `_`, so path
/// separators cannot survive. A missing `.sql` suffix (checked
/// case-insensitively) is appended.
pub fn sanitize_file_name(raw: &str) -> ExportResult<String> {
    let sanitized: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut name = Path::new(&sanitized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(ExportError::invalid_export_path(raw, "empty file name"));
    }

    if !name.to_ascii_lowercase().ends_with(SQL_SUFFIX) {
        name.push_str(SQL_SUFFIX);
    }
    Ok(name)
}

/// Resolve `raw` inside `base_dir`, creating the directory if needed.
///
/// Fails with [`ExportError::InvalidExportPath`] before any file is opened
/// when the resolved location escapes the base directory.
pub async fn resolve_export_path(base_dir: &Path, raw: &str) -> ExportResult<PathBuf> {
    let name = sanitize_file_name(raw)?;

    tokio::fs::create_dir_all(base_dir).await.map_err(|e| {
        ExportError::invalid_export_path(base_dir.display().to_string(), e.to_string())
    })?;
    let base = tokio::fs::canonicalize(base_dir).await.map_err(|e| {
        ExportError::invalid_export_path(base_dir.display().to_string(), e.to_string())
    })?;

    let path = base.join(&name);
    let parent = match path.parent() {
        Some(parent) => tokio::fs::canonicalize(parent)
            .await
            .map_err(|e| ExportError::invalid_export_path(raw, e.to_string()))?,
        None => return Err(ExportError::invalid_export_path(raw, "no parent directory")),
    };
    if !parent.starts_with(&base) {
        return Err(ExportError::invalid_export_path(
            raw,
            "outside export directory",
        ));
    }
    Ok(path)
}
