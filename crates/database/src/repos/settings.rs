//! Global settings table.

use crate::error::DatabaseResult;
use async_trait::async_trait;

pub(crate) const UPDATE_SETTING: &str = "UPDATE globals SET gl_value = ? WHERE gl_name = ?";
pub(crate) const SELECT_SETTING: &str = "SELECT gl_value FROM globals WHERE gl_name = ?";

/// Repository for the key/value settings table.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Update an existing setting. Returns the number of rows changed;
    /// zero means no row with that name exists.
    async fn update_setting(&self, name: &str, value: &str) -> DatabaseResult<u64>;

    /// Current value of a setting.
    async fn get_setting(&self, name: &str) -> DatabaseResult<Option<String>>;
}
