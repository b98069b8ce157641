//! Application database trait and the SQLite implementation.

use crate::error::DatabaseResult;
use crate::models::OAuthClientRow;
use crate::repos::clients::{DELETE_CLIENTS, ENABLE_CLIENTS, SELECT_CLIENTS};
use crate::repos::keys::{COUNT_KEYS, DELETE_KEYS};
use crate::repos::schema::{checked_identifier, quote_identifier};
use crate::repos::settings::{SELECT_SETTING, UPDATE_SETTING};
use crate::repos::{ClientRepo, KeyRepo, SchemaRepo, SettingsRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

const LIST_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Combined application database trait.
#[async_trait]
pub trait AppDatabase: SchemaRepo + SettingsRepo + KeyRepo + ClientRepo + Send + Sync {
    /// Raw connectivity check.
    async fn ping(&self) -> DatabaseResult<()>;

    /// Short backend name for log fields.
    fn backend_name(&self) -> &'static str;
}

/// SQLite-backed application database.
///
/// Used for tests and local runs. The schema is created by whoever plays the
/// installer; this store never migrates anything.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub async fn new(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection keeps `PRAGMA foreign_keys` scoped to the drop
        // sequence and avoids "database is locked" under test concurrency.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl AppDatabase for SqliteStore {
    async fn ping(&self) -> DatabaseResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[async_trait]
impl SchemaRepo for SqliteStore {
    #[instrument(skip(self))]
    async fn table_row_count(&self, table: &str) -> DatabaseResult<Option<u64>> {
        let table = checked_identifier(table)?;
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        if exists == 0 {
            return Ok(None);
        }

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_identifier(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(count.max(0) as u64))
    }

    async fn list_tables(&self) -> DatabaseResult<Vec<String>> {
        let tables = sqlx::query_scalar(LIST_TABLES)
            .fetch_all(&self.pool)
            .await?;
        Ok(tables)
    }

    #[instrument(skip(self))]
    async fn drop_all_tables(&self) -> DatabaseResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;

        let dropped = drop_listed_tables(&mut *conn).await;

        // Re-enable before surfacing any list or drop failure.
        let restored = sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await;
        if restored.is_err() {
            drop(conn.detach());
        }
        let dropped = dropped?;
        restored?;

        tracing::info!(count = dropped.len(), "Dropped all tables");
        Ok(dropped)
    }
}

async fn drop_listed_tables(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let tables: Vec<String> = sqlx::query_scalar(LIST_TABLES)
        .fetch_all(&mut *conn)
        .await?;
    for table in &tables {
        let statement = format!("DROP TABLE IF EXISTS {}", quote_identifier(table));
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(tables)
}

#[async_trait]
impl SettingsRepo for SqliteStore {
    async fn update_setting(&self, name: &str, value: &str) -> DatabaseResult<u64> {
        let result = sqlx::query(UPDATE_SETTING)
            .bind(value)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_setting(&self, name: &str) -> DatabaseResult<Option<String>> {
        let value = sqlx::query_scalar(SELECT_SETTING)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl KeyRepo for SqliteStore {
    async fn count_key_rows(&self) -> DatabaseResult<u64> {
        let count: i64 = sqlx::query_scalar(COUNT_KEYS)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn delete_key_rows(&self) -> DatabaseResult<u64> {
        let result = sqlx::query(DELETE_KEYS).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ClientRepo for SqliteStore {
    async fn list_clients_by_name(
        &self,
        client_name: &str,
    ) -> DatabaseResult<Vec<OAuthClientRow>> {
        let rows = sqlx::query_as::<_, OAuthClientRow>(SELECT_CLIENTS)
            .bind(client_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn enable_client_by_name(&self, client_name: &str) -> DatabaseResult<u64> {
        let result = sqlx::query(ENABLE_CLIENTS)
            .bind(client_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_clients_by_name(&self, client_name: &str) -> DatabaseResult<u64> {
        let result = sqlx::query(DELETE_CLIENTS)
            .bind(client_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
