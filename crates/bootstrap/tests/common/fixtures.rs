//! Test environment: a temp directory, a testing config and an SQLite database.

use coldstart_core::config::AppConfig;
use coldstart_database::{AppDatabase, SqliteStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// The application tables a cold start touches.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL
);
CREATE TABLE users_secure (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id)
);
CREATE TABLE globals (
    gl_name TEXT NOT NULL,
    gl_index INTEGER NOT NULL DEFAULT 0,
    gl_value TEXT,
    PRIMARY KEY (gl_name, gl_index)
);
CREATE TABLE `keys` (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    value TEXT
);
CREATE TABLE oauth_clients (
    client_id TEXT PRIMARY KEY,
    client_name TEXT NOT NULL,
    client_secret TEXT,
    is_enabled INTEGER NOT NULL DEFAULT 0
);
"#;

/// Rows the installer leaves behind.
pub const INSTALLED_ROWS: &str = r#"
INSERT INTO users (id, username) VALUES (1, 'admin');
INSERT INTO users_secure (id, user_id) VALUES (1, 1);
INSERT INTO globals (gl_name, gl_value) VALUES ('rest_api', '0'), ('oauth_password_grant', '0');
"#;

pub struct TestEnv {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub temp_dir: TempDir,
}

impl TestEnv {
    /// Empty database, no tables.
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = AppConfig::for_testing(temp_dir.path());
        let store = SqliteStore::new(temp_dir.path().join("app.db"))
            .await
            .expect("Failed to open SQLite database");
        Self {
            config,
            store: Arc::new(store),
            temp_dir,
        }
    }

    /// Schema present, no rows.
    pub async fn with_schema() -> Self {
        let env = Self::new().await;
        sqlx::raw_sql(SQLITE_SCHEMA)
            .execute(env.pool())
            .await
            .expect("Failed to create schema");
        env
    }

    /// Schema and installer rows present.
    pub async fn installed() -> Self {
        let env = Self::with_schema().await;
        sqlx::raw_sql(INSTALLED_ROWS)
            .execute(env.pool())
            .await
            .expect("Failed to seed rows");
        env
    }

    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    pub fn db(&self) -> Arc<dyn AppDatabase> {
        self.store.clone()
    }

    pub async fn client_rows(&self, client_name: &str) -> Vec<(String, Option<String>, bool)> {
        sqlx::query_as::<_, (String, Option<String>, bool)>(
            "SELECT client_id, client_secret, is_enabled FROM oauth_clients WHERE client_name = ? ORDER BY client_id",
        )
        .bind(client_name)
        .fetch_all(self.pool())
        .await
        .expect("Failed to list clients")
    }

    pub async fn key_row_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM `keys`")
            .fetch_one(self.pool())
            .await
            .expect("Failed to count key rows")
    }
}
