//! Local filesystem secret store.
//!
//! Layout: `<root>/<name>/v<N>`, one file per version. Reads return the
//! highest version; writes add `v<N+1>`. Useful for local runs and for
//! deployments that mount a persistent volume instead of a cloud store.

use crate::error::SecretResult;
use crate::traits::{SecretStore, validate_secret_name};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Versioned secrets stored as plain files.
pub struct FilesystemSecretStore {
    root: PathBuf,
}

impl FilesystemSecretStore {
    /// Create a new filesystem secret store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> SecretResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn secret_dir(&self, name: &str) -> SecretResult<PathBuf> {
        validate_secret_name(name)?;
        Ok(self.root.join(name))
    }

    /// Highest existing version number in `dir`, if any.
    async fn latest_version(dir: &Path) -> SecretResult<Option<u64>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest = None;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(version) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix('v'))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            latest = latest.max(Some(version));
        }
        Ok(latest)
    }
}

#[async_trait]
impl SecretStore for FilesystemSecretStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read(&self, name: &str) -> SecretResult<Option<String>> {
        let dir = self.secret_dir(name)?;
        let Some(version) = Self::latest_version(&dir).await? else {
            return Ok(None);
        };
        let value = fs::read_to_string(dir.join(format!("v{version}"))).await?;
        Ok(Some(value))
    }

    #[instrument(skip(self, value), fields(backend = "filesystem"))]
    async fn write(&self, name: &str, value: &str) -> SecretResult<()> {
        let dir = self.secret_dir(name)?;
        fs::create_dir_all(&dir).await?;

        let next = Self::latest_version(&dir).await?.map_or(1, |v| v + 1);
        let path = dir.join(format!("v{next}"));

        // Write to temp file, fsync, then rename so readers never see a partial version
        let temp_path = dir.join(format!(".tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(version = next, "Added secret version");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
