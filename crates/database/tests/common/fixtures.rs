//! Application schema fixtures.

use coldstart_database::{DatabaseResult, SqliteStore};
use tempfile::TempDir;

/// The subset of the application schema a cold start touches, plus one
/// table with a foreign key so schema resets exercise the FK toggle.
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

/// A test database wrapper that cleans up on drop.
pub struct TestDatabase {
    pub store: SqliteStore,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Empty database file with no tables.
    pub async fn empty() -> DatabaseResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("app.db")).await?;
        Ok(Self {
            store,
            _temp_dir: temp_dir,
        })
    }

    /// Database with the application schema and no rows.
    pub async fn with_schema() -> DatabaseResult<Self> {
        let db = Self::empty().await?;
        sqlx::raw_sql(SQLITE_SCHEMA).execute(db.store.pool()).await?;
        Ok(db)
    }

    /// Database with the schema, one admin user, settings, key rows and a client.
    pub async fn installed() -> DatabaseResult<Self> {
        let db = Self::with_schema().await?;
        sqlx::raw_sql(
            r#"
            INSERT INTO users (id, username) VALUES (1, 'admin');
            INSERT INTO users_secure (id, user_id) VALUES (1, 1);
            INSERT INTO globals (gl_name, gl_value) VALUES ('rest_api', '0'), ('oauth_password_grant', '0');
            INSERT INTO `keys` (name, value) VALUES ('oauth2key', 'enc-key'), ('oauth2passphrase', 'enc-pass');
            INSERT INTO oauth_clients (client_id, client_name, is_enabled) VALUES ('existing-id', 'openemr-ai-agent', 1);
            "#,
        )
        .execute(db.store.pool())
        .await?;
        Ok(db)
    }
}
