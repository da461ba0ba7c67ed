//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use db_exporter::config::PoolOptions;
use db_exporter::db::{ConnectionManager, DbPool};
use db_exporter::models::ConnectionConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A SQLite source file populated by `statements`.
pub struct SqliteSource {
    pub dir: TempDir,
    pub path: PathBuf,
    pub manager: ConnectionManager,
}

impl SqliteSource {
    /// Create the database with a writable pool, then register it read-only.
    pub async fn new(statements: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.db");
        seed(&path, statements).await;

        let manager = ConnectionManager::new();
        let config = ConnectionConfig::new(
            "source",
            format!("sqlite:{}", path.display()),
            Some("source".to_string()),
            PoolOptions::default(),
        )
        .unwrap();
        manager.connect(config).await.unwrap();
        Self { dir, path, manager }
    }

    pub async fn pool(&self) -> DbPool {
        self.manager.get_pool("source").await.unwrap()
    }
}

/// Run `statements` against a (new or existing) SQLite file.
pub async fn seed(path: &Path, statements: &[&str]) {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .unwrap();
    for statement in statements {
        sqlx::raw_sql(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

/// Count rows of `table` in a SQLite file.
pub async fn count_rows(path: &Path, table: &str) -> i64 {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", path.display()))
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    count
}

/// `INSERT` statements in a dump, each including its `;` terminator line.
pub fn insert_statements(dump: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut rest = dump;
    while let Some(start) = rest.find("INSERT INTO ") {
        let tail = &rest[start..];
        let end = tail.find("\r\n;\r\n").map(|i| i + 5).unwrap_or(tail.len());
        statements.push(&tail[..end]);
        rest = &tail[end..];
    }
    statements
}

pub const NUMBERED_ITEMS: &[&str] = &[
    "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL, price REAL)",
    "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 250) \
     INSERT INTO items (id, label, price) SELECT i, 'item ' || i, i * 1.5 FROM n",
];
