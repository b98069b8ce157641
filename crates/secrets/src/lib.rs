//! External secret store access for coldstart.
//!
//! Credentials issued during a cold start must survive the next one, and the
//! container filesystem does not. This crate provides:
//! - The [`SecretStore`] trait (read latest version, add a version)
//! - A Google Cloud Secret Manager backend
//! - A versioned local filesystem backend

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemSecretStore, gcp::GcpSecretManager};
pub use error::{SecretError, SecretResult};
pub use traits::{SecretStore, validate_secret_name};

use coldstart_core::config::SecretsConfig;
use std::sync::Arc;

/// Create a secret store from configuration. `Disabled` yields `None`.
pub async fn from_config(config: &SecretsConfig) -> SecretResult<Option<Arc<dyn SecretStore>>> {
    config.validate().map_err(SecretError::Config)?;

    match config {
        SecretsConfig::Gcp {
            project_id,
            metadata_url,
            api_base_url,
            access_token,
        } => {
            let backend =
                GcpSecretManager::new(project_id, metadata_url, api_base_url, access_token.clone())?;
            Ok(Some(Arc::new(backend) as Arc<dyn SecretStore>))
        }
        SecretsConfig::Filesystem { path } => {
            let backend = FilesystemSecretStore::new(path).await?;
            Ok(Some(Arc::new(backend) as Arc<dyn SecretStore>))
        }
        SecretsConfig::Disabled => Ok(None),
    }
}
