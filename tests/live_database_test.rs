//! Exports against live MySQL and PostgreSQL servers.
//!
//! Skipped unless `TEST_MYSQL_URL` / `TEST_PG_URL` point at a scratch
//! database the test may create tables in.

use db_exporter::config::PoolOptions;
use db_exporter::db::{ConnectionManager, SchemaIntrospector};
use db_exporter::export::SqlExporter;
use db_exporter::models::{ConnectionConfig, Dialect, ExportRequest, TableOutcome};

async fn connect(id: &str, url: &str) -> ConnectionManager {
    let manager = ConnectionManager::new();
    let config = ConnectionConfig::new(id, url, None, PoolOptions::default()).unwrap();
    manager.connect(config).await.unwrap();
    manager
}

#[tokio::test]
async fn test_mysql_export() {
    let Ok(url) = std::env::var("TEST_MYSQL_URL") else {
        return;
    };
    let setup = sqlx::MySqlPool::connect(&url).await.unwrap();
    sqlx::raw_sql(
        "DROP TABLE IF EXISTS export_probe; \
         CREATE TABLE export_probe (id INT AUTO_INCREMENT PRIMARY KEY, flag TINYINT(1), note VARCHAR(40)); \
         INSERT INTO export_probe (flag, note) VALUES (1, 'it''s'), (0, NULL);",
    )
    .execute(&setup)
    .await
    .unwrap();
    setup.close().await;

    let manager = connect("mysql_probe", &url).await;
    let pool = manager.get_pool("mysql_probe").await.unwrap();
    let descriptor = SchemaIntrospector::list_columns(&pool, "export_probe", None)
        .await
        .unwrap();
    assert_eq!(descriptor.primary_key(), ["id"]);

    let exporter = SqlExporter::new(&pool).unwrap();
    let mut out = Vec::new();
    let report = exporter
        .export(&ExportRequest::for_tables(["export_probe"]), &mut out)
        .await
        .unwrap();
    assert!(matches!(
        &report.outcomes[0],
        TableOutcome::Exported { rows: 2, .. }
    ));
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("CREATE TABLE IF NOT EXISTS `export_probe`"));
    assert!(text.contains("AUTO_INCREMENT"));
    assert!(text.contains("'it''s'"));

    let mut pg = Vec::new();
    exporter
        .export_structure(&["export_probe".to_string()], None, Some(Dialect::PgSql), &mut pg)
        .await
        .unwrap();
    assert!(String::from_utf8(pg).unwrap().contains("\"id\" SERIAL"));
    manager.close_all().await;
}

#[tokio::test]
async fn test_postgres_export_defaults_to_public_schema() {
    let Ok(url) = std::env::var("TEST_PG_URL") else {
        return;
    };
    let setup = sqlx::PgPool::connect(&url).await.unwrap();
    sqlx::raw_sql(
        "DROP TABLE IF EXISTS public.export_probe; \
         CREATE TABLE public.export_probe (id SERIAL PRIMARY KEY, active BOOLEAN NOT NULL, amount NUMERIC(10,2)); \
         INSERT INTO public.export_probe (active, amount) VALUES (TRUE, 12.50), (FALSE, NULL);",
    )
    .execute(&setup)
    .await
    .unwrap();
    setup.close().await;

    let manager = connect("pg_probe", &url).await;
    let pool = manager.get_pool("pg_probe").await.unwrap();
    let exporter = SqlExporter::new(&pool).unwrap();
    let mut out = Vec::new();
    exporter
        .export(&ExportRequest::for_tables(["export_probe"]), &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("\"public\".\"export_probe\""));
    assert!(text.contains("TRUE"));
    assert!(text.contains("NULL"));
    manager.close_all().await;
}
