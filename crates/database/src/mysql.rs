//! MySQL-backed application database.

use crate::error::DatabaseResult;
use crate::models::OAuthClientRow;
use crate::repos::clients::{DELETE_CLIENTS, ENABLE_CLIENTS, SELECT_CLIENTS};
use crate::repos::keys::{COUNT_KEYS, DELETE_KEYS};
use crate::repos::schema::{checked_identifier, quote_identifier};
use crate::repos::settings::{SELECT_SETTING, UPDATE_SETTING};
use crate::repos::{ClientRepo, KeyRepo, SchemaRepo, SettingsRepo};
use crate::store::AppDatabase;
use async_trait::async_trait;
use coldstart_core::config::DatabaseConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions};
use sqlx::{MySql, Pool};
use tracing::instrument;

const LIST_TABLES: &str = "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name";

/// MySQL-backed application database.
pub struct MySqlStore {
    pool: Pool<MySql>,
}

impl MySqlStore {
    /// Build a store without connecting.
    ///
    /// Connections are opened on first use, so an unreachable server surfaces
    /// as an error from [`AppDatabase::ping`] instead of from construction.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let opts = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.login)
            .password(&config.password)
            .database(&config.name);

        // Log connection info without password
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            username = %config.login,
            "Configured MySQL connection"
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_lazy_with(opts);

        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl AppDatabase for MySqlStore {
    async fn ping(&self) -> DatabaseResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mysql"
    }
}

#[async_trait]
impl SchemaRepo for MySqlStore {
    #[instrument(skip(self))]
    async fn table_row_count(&self, table: &str) -> DatabaseResult<Option<u64>> {
        let table = checked_identifier(table)?;
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
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
        // FOREIGN_KEY_CHECKS is per session, so everything runs on one connection.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut *conn)
            .await?;

        let dropped = drop_listed_tables(&mut *conn).await;

        let restored = sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
            .execute(&mut *conn)
            .await;
        if restored.is_err() {
            // The session still has checks disabled; keep it out of the pool.
            drop(conn.detach());
        }
        let dropped = dropped?;
        restored?;

        tracing::info!(count = dropped.len(), "Dropped all tables");
        Ok(dropped)
    }
}

async fn drop_listed_tables(conn: &mut MySqlConnection) -> Result<Vec<String>, sqlx::Error> {
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
impl SettingsRepo for MySqlStore {
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
impl KeyRepo for MySqlStore {
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
impl ClientRepo for MySqlStore {
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
