//! Schema inspection and reset.

use crate::error::{DatabaseError, DatabaseResult};
use async_trait::async_trait;
use coldstart_core::config::is_sql_identifier;

/// Repository for schema-level operations.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
    /// Row count of `table`, or `None` if the table does not exist.
    async fn table_row_count(&self, table: &str) -> DatabaseResult<Option<u64>>;

    /// Names of every base table in the database.
    async fn list_tables(&self) -> DatabaseResult<Vec<String>>;

    /// Drop every table with foreign-key checks disabled for the duration.
    /// Returns the dropped table names.
    async fn drop_all_tables(&self) -> DatabaseResult<Vec<String>>;
}

/// Reject anything but a plain identifier before it is spliced into SQL.
pub(crate) fn checked_identifier(table: &str) -> DatabaseResult<&str> {
    if is_sql_identifier(table) {
        Ok(table)
    } else {
        Err(DatabaseError::InvalidIdentifier(table.to_string()))
    }
}

/// Backtick-quote a server-reported table name. Both MySQL and SQLite accept this form.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
