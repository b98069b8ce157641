//! OAuth client registrations.

use crate::error::DatabaseResult;
use crate::models::OAuthClientRow;
use async_trait::async_trait;

pub(crate) const SELECT_CLIENTS: &str = "SELECT client_id, client_name, is_enabled FROM oauth_clients WHERE client_name = ? ORDER BY client_id";
pub(crate) const ENABLE_CLIENTS: &str =
    "UPDATE oauth_clients SET is_enabled = 1 WHERE client_name = ?";
pub(crate) const DELETE_CLIENTS: &str = "DELETE FROM oauth_clients WHERE client_name = ?";

/// Repository for OAuth client rows.
#[async_trait]
pub trait ClientRepo: Send + Sync {
    /// Every registration with the given name.
    async fn list_clients_by_name(&self, client_name: &str)
    -> DatabaseResult<Vec<OAuthClientRow>>;

    /// Enable every registration with the given name. Returns rows changed.
    async fn enable_client_by_name(&self, client_name: &str) -> DatabaseResult<u64>;

    /// Delete every registration with the given name. Returns rows deleted.
    async fn delete_clients_by_name(&self, client_name: &str) -> DatabaseResult<u64>;
}
