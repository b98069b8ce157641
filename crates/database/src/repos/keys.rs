//! Authorization-server key rows.

use crate::error::DatabaseResult;
use async_trait::async_trait;

pub(crate) const COUNT_KEYS: &str = "SELECT COUNT(*) FROM `keys`";
pub(crate) const DELETE_KEYS: &str = "DELETE FROM `keys`";

/// Repository for the encrypted signing key and passphrase rows.
#[async_trait]
pub trait KeyRepo: Send + Sync {
    /// Number of stored key rows.
    async fn count_key_rows(&self) -> DatabaseResult<u64>;

    /// Delete every key row. Deleting from an empty table is not an error.
    async fn delete_key_rows(&self) -> DatabaseResult<u64>;
}
