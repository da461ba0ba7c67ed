//! HTTP transport serving interactive exports.
//!
//! Endpoints:
//! - `POST /export/sql`: append one table's structure and/or data to a file
//!   in the export directory
//! - `GET /export/xlsx`: workbook download, one sheet per table
//! - `GET /export/csv`: single-table CSV download
//! - `GET /tables`: table names of a source

use crate::db::{ConnectionManager, Page, RowStreamer, SchemaCache, SchemaIntrospector};
use crate::error::{ExportError, ExportResult};
use crate::export::{
    CsvWriter, DatabaseXlsxExporter, Download, SqlExporter, resolve_export_path,
};
use crate::models::{BatchLimits, Dialect, ExportResponse, ExportScope, ExportUnit, TableOutcome};
use crate::transport::Transport;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_WORKBOOK_NAME: &str = "export.xlsx";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    connections: Arc<ConnectionManager>,
    export_dir: PathBuf,
    limits: BatchLimits,
    /// Cancelled on shutdown; in-flight exports stop at their next row.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        connections: Arc<ConnectionManager>,
        export_dir: impl Into<PathBuf>,
        limits: BatchLimits,
    ) -> Self {
        Self {
            connections,
            export_dir: export_dir.into(),
            limits,
            shutdown: CancellationToken::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Body of `POST /export/sql`.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlExportForm {
    /// Source connection ID (default: the first configured database)
    #[serde(default)]
    pub connection: Option<String>,
    pub file_name: String,
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub target_dialect: Option<Dialect>,
    #[serde(default = "default_true")]
    pub include_structure: bool,
    #[serde(default = "default_true")]
    pub include_data: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkbookParams {
    pub connection: Option<String>,
    /// Comma-separated table names (default: all)
    pub tables: Option<String>,
    pub schema: Option<String>,
    pub sheet_prefix: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CsvParams {
    pub connection: Option<String>,
    pub table: String,
    pub schema: Option<String>,
    pub file_name: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TablesParams {
    pub connection: Option<String>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableList {
    pub connection: String,
    pub dialect: Dialect,
    pub tables: Vec<String>,
}

/// Build the export router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/export/sql", post(export_sql))
        .route("/export/xlsx", get(export_xlsx))
        .route("/export/csv", get(export_csv))
        .route("/tables", get(list_tables))
        .with_state(state)
}

async fn export_sql(State(state): State<AppState>, Json(form): Json<SqlExportForm>) -> Response {
    let result = append_sql(&state, &form).await;
    if let Err(e) = &result {
        warn!(table = %form.table_name, error = %e, "SQL export failed");
    }
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    (status, Json(ExportResponse::from(&result))).into_response()
}

/// Export one table and append the statements to the requested file.
///
/// The path is checked before the source is touched, and the file is only
/// opened once the whole table has been rendered.
async fn append_sql(state: &AppState, form: &SqlExportForm) -> ExportResult<TableOutcome> {
    let path = resolve_export_path(&state.export_dir, &form.file_name).await?;
    let scope = ExportScope::from_flags(form.include_structure, form.include_data)
        .ok_or_else(|| {
            ExportError::invalid_input("Nothing to export: both structure and data are disabled")
        })?;
    let table = form.table_name.trim();
    if table.is_empty() {
        return Err(ExportError::invalid_input("Table name is required"));
    }

    let (_, pool) = state.connections.resolve(form.connection.as_deref()).await?;
    let cache = SchemaCache::new();
    let exporter = SqlExporter::new(&pool)?
        .with_cache(&cache)
        .with_cancel(state.shutdown.child_token());
    let unit = ExportUnit::new(table, form.target_dialect.unwrap_or(exporter.source()))
        .with_schema(form.schema.clone())
        .with_scope(scope);

    let mut buffer = Vec::new();
    let outcome = exporter.export_table(&unit, state.limits, &mut buffer).await?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(&buffer).await?;
    file.flush().await?;

    info!(
        table = %table,
        file = %path.display(),
        bytes = buffer.len(),
        "Appended SQL export"
    );
    Ok(outcome)
}

async fn export_xlsx(
    State(state): State<AppState>,
    Query(params): Query<WorkbookParams>,
) -> Response {
    download_response(build_workbook(&state, &params).await)
}

async fn build_workbook(state: &AppState, params: &WorkbookParams) -> ExportResult<Download> {
    let (_, pool) = state.connections.resolve(params.connection.as_deref()).await?;
    let cache = SchemaCache::new();
    let mut exporter = DatabaseXlsxExporter::new(&pool)
        .with_schema(params.schema.clone())
        .with_cache(&cache)
        .with_cancel(state.shutdown.child_token());
    if let Some(prefix) = &params.sheet_prefix {
        exporter = exporter.with_sheet_prefix(prefix.clone());
    }
    let file_name = params.file_name.as_deref().unwrap_or(DEFAULT_WORKBOOK_NAME);
    exporter
        .export(&split_tables(params.tables.as_deref()), file_name)
        .await
}

async fn export_csv(State(state): State<AppState>, Query(params): Query<CsvParams>) -> Response {
    download_response(build_csv(&state, &params).await)
}

async fn build_csv(state: &AppState, params: &CsvParams) -> ExportResult<Download> {
    let table = params.table.trim();
    let (_, pool) = state.connections.resolve(params.connection.as_deref()).await?;
    let streamer = RowStreamer::new(&pool).with_cancel(state.shutdown.child_token());
    let query = streamer
        .query(table, params.schema.as_deref())?
        .with_window(Page::window(params.limit, params.offset));
    let mut source = streamer.open(&query).await?;
    let file_name = params
        .file_name
        .clone()
        .unwrap_or_else(|| format!("{}.csv", table));
    CsvWriter::download(&mut source, &file_name, None, None).await
}

async fn list_tables(
    State(state): State<AppState>,
    Query(params): Query<TablesParams>,
) -> Response {
    match table_list(&state, &params).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => failure_response(&e),
    }
}

async fn table_list(state: &AppState, params: &TablesParams) -> ExportResult<TableList> {
    let (connection, pool) = state.connections.resolve(params.connection.as_deref()).await?;
    let tables = SchemaIntrospector::list_tables(&pool, params.schema.as_deref()).await?;
    Ok(TableList {
        connection,
        dialect: pool.dialect(),
        tables,
    })
}

fn split_tables(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn download_response(result: ExportResult<Download>) -> Response {
    let download = match result {
        Ok(download) => download,
        Err(e) => return failure_response(&e),
    };

    let mut headers = HeaderMap::new();
    for (name, value) in download.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name, "Dropping unrepresentable response header"),
        }
    }
    (StatusCode::OK, headers, download.body).into_response()
}

fn failure_response(error: &ExportError) -> Response {
    warn!(error = %error, "Export request failed");
    (status_for(error), Json(ExportResponse::from_error(error))).into_response()
}

fn status_for(error: &ExportError) -> StatusCode {
    match error {
        ExportError::InvalidExportPath { .. }
        | ExportError::InvalidInput { .. }
        | ExportError::UnsupportedDriver { .. } => StatusCode::BAD_REQUEST,
        ExportError::SchemaIntrospection { .. } => StatusCode::NOT_FOUND,
        ExportError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// HTTP transport over the export router.
pub struct HttpTransport {
    state: AppState,
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(state: AppState, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> ExportResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting export server on {}", bind_addr);

        let app = router(self.state.clone());
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ExportError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(export_dir = %self.state.export_dir.display(), "Export endpoints ready");

        // Large downloads may outlive the signal; force exit after a timeout
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown = self.state.shutdown.clone();
        let trigger = shutdown.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            trigger.cancel();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(ExportError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown.cancelled().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for downloads to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.state.connections.close_all().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::models::ConnectionConfig;
    use axum::body::to_bytes;
    use tempfile::TempDir;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn sqlite_state() -> (TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        let setup = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&setup)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (id, name) VALUES (1, 'ann'), (2, 'bob')")
            .execute(&setup)
            .await
            .unwrap();
        setup.close().await;

        let manager = ConnectionManager::new();
        let config = ConnectionConfig::new(
            "shop",
            format!("sqlite:{}", path.display()),
            Some("shop".to_string()),
            PoolOptions::default(),
        )
        .unwrap();
        manager.connect(config).await.unwrap();

        let state = AppState::new(
            Arc::new(manager),
            dir.path().join("exports"),
            BatchLimits::default(),
        );
        (dir, state)
    }

    fn form(file_name: &str) -> SqlExportForm {
        SqlExportForm {
            connection: None,
            file_name: file_name.to_string(),
            table_name: "users".to_string(),
            schema: None,
            target_dialect: None,
            include_structure: true,
            include_data: true,
        }
    }

    #[test]
    fn test_http_transport_bind_addr() {
        let state = AppState::new(
            Arc::new(ConnectionManager::new()),
            "exports",
            BatchLimits::default(),
        );
        let transport = HttpTransport::new(state, "0.0.0.0", 3000);
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_split_tables() {
        assert_eq!(split_tables(Some(" a, ,b ")), ["a", "b"]);
        assert!(split_tables(None).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_file_path_is_rejected_before_export() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Arc::new(ConnectionManager::new()),
            dir.path().join("exports"),
            BatchLimits::default(),
        );

        let response = export_sql(State(state), Json(form(".."))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "error": "Invalid file path."})
        );
    }

    #[tokio::test]
    async fn test_sql_export_appends_to_file() {
        let (dir, state) = sqlite_state().await;

        for _ in 0..2 {
            let response = export_sql(State(state.clone()), Json(form("../dump"))).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, serde_json::json!({"success": true}));
        }

        let written = std::fs::read_to_string(dir.path().join("exports").join(".._dump.sql")).unwrap();
        assert_eq!(written.matches("-- Database structure of `users`").count(), 2);
        assert_eq!(written.matches("-- Database content of `users`").count(), 2);
        let (first, second) = written.split_at(written.len() / 2);
        assert_eq!(first, second);
        assert!(written.contains("'ann'"));
    }

    #[tokio::test]
    async fn test_unknown_table_reports_failure() {
        let (_dir, state) = sqlite_state().await;
        let mut request = form("missing");
        request.table_name = "ghosts".to_string();

        let response = export_sql(State(state), Json(request)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("ghosts"));
    }

    #[tokio::test]
    async fn test_csv_download_headers() {
        let (_dir, state) = sqlite_state().await;
        let params = CsvParams {
            connection: Some("shop".to_string()),
            table: "users".to_string(),
            schema: None,
            file_name: None,
            limit: None,
            offset: None,
        };

        let response = export_csv(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers["content-type"], "text/csv");
        assert_eq!(headers["content-disposition"], "attachment; filename=\"users.csv\"");
        assert_eq!(headers["pragma"], "public");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Id,Name\r\n1,ann\r\n2,bob\r\n");
    }

    #[tokio::test]
    async fn test_csv_download_window() {
        let (_dir, state) = sqlite_state().await;
        let params = CsvParams {
            connection: None,
            table: "users".to_string(),
            schema: None,
            file_name: Some("page.csv".to_string()),
            limit: Some(1),
            offset: Some(1),
        };

        let response = export_csv(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Id,Name\r\n2,bob\r\n");
    }

    #[tokio::test]
    async fn test_xlsx_download() {
        let (_dir, state) = sqlite_state().await;
        let params = WorkbookParams {
            sheet_prefix: Some("shop_".to_string()),
            ..WorkbookParams::default()
        };

        let response = export_xlsx(State(state), Query(params)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            crate::export::XLSX_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        // xlsx files are zip archives
        assert_eq!(&body[..2], b"PK");
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_dir, state) = sqlite_state().await;
        let response = list_tables(State(state), Query(TablesParams::default())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["connection"], "shop");
        assert_eq!(body["dialect"], "sqlite");
        assert_eq!(body["tables"], serde_json::json!(["users"]));
    }
}
