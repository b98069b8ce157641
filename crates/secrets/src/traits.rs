//! Secret store trait definitions.

use crate::error::{SecretError, SecretResult};
use async_trait::async_trait;

/// Longest secret name accepted by any backend.
pub const MAX_SECRET_NAME_LEN: usize = 255;

/// A remote store of named, versioned secrets that outlives the container.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Latest version of a secret, or `None` if it has no accessible version.
    async fn read(&self, name: &str) -> SecretResult<Option<String>>;

    /// Add a new version of a secret.
    async fn write(&self, name: &str, value: &str) -> SecretResult<()>;

    /// Short backend name for log fields.
    fn backend_name(&self) -> &'static str;
}

/// Validate a secret name: ASCII letters, digits, `_` and `-`.
pub fn validate_secret_name(name: &str) -> SecretResult<()> {
    if name.is_empty() || name.len() > MAX_SECRET_NAME_LEN {
        return Err(SecretError::InvalidName(format!(
            "length must be 1..={MAX_SECRET_NAME_LEN}: {name:?}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SecretError::InvalidName(format!(
            "only letters, digits, '_' and '-' are allowed: {name:?}"
        )));
    }
    Ok(())
}
