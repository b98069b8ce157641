//! Secret store error types.

use thiserror::Error;

/// Secret store operation errors.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid secret name: {0}")]
    InvalidName(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("secret store API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to obtain access token: {0}")]
    Token(String),

    #[error("invalid secret payload: {0}")]
    Payload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for secret store operations.
pub type SecretResult<T> = std::result::Result<T, SecretError>;
