//! Database error types.

use thiserror::Error;

/// Application database operation errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Whether the error means the server could not be reached at all,
    /// as opposed to a statement failing on a live connection.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DatabaseError::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}

/// Result type for database operations.
pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;
