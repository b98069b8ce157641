//! Rows read from the application schema.

use sqlx::FromRow;

/// A registered OAuth client as stored by the application service.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct OAuthClientRow {
    pub client_id: String,
    pub client_name: String,
    pub is_enabled: bool,
}
