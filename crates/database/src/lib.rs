//! Application database access for coldstart.
//!
//! The application installer owns the schema. This crate only answers the
//! questions a cold start asks of it:
//! - Is the canonical table present, and does it hold rows?
//! - Reset a partially created schema
//! - Push settings overrides into the globals table
//! - Clear the authorization-server key rows
//! - Enable, list and delete OAuth client registrations

pub mod error;
pub mod models;
pub mod mysql;
pub mod repos;
pub mod store;

pub use error::{DatabaseError, DatabaseResult};
pub use models::OAuthClientRow;
pub use mysql::MySqlStore;
pub use store::{AppDatabase, SqliteStore};

use coldstart_core::config::{DatabaseBackend, DatabaseConfig};
use std::sync::Arc;

/// Create an application database handle from configuration.
pub async fn from_config(config: &DatabaseConfig) -> DatabaseResult<Arc<dyn AppDatabase>> {
    match &config.backend {
        DatabaseBackend::Mysql => {
            if config.host.is_empty() || config.name.is_empty() {
                return Err(DatabaseError::Config(
                    "database.host and database.name are required for mysql".to_string(),
                ));
            }
            Ok(Arc::new(MySqlStore::connect_lazy(config)) as Arc<dyn AppDatabase>)
        }
        DatabaseBackend::Sqlite { path } => {
            tracing::warn!(
                path = %path.display(),
                "Using SQLite application database; intended for tests and local runs only"
            );
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn AppDatabase>)
        }
    }
}
