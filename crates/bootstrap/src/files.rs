//! Atomic file writes for the files a cold start owns.

use crate::error::{BootstrapError, BootstrapResult};
use coldstart_core::envfile;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Replace `path` with `contents` via a synced temp file and a rename.
///
/// Parent directories are created. With `mode` set (unix only), the file is
/// created with those permission bits before any content is written.
pub async fn write_atomic(path: &Path, contents: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    );

    let result = async {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if let Some(mode) = mode {
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    result
}

/// Set `KEY=value` pairs in an env file, creating it if absent.
///
/// Unrelated lines are preserved. The file ends up owner-read/write only.
pub async fn update_env_file(path: &Path, updates: &[(&str, &str)]) -> BootstrapResult<()> {
    let current = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(BootstrapError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let updated = envfile::set_vars(&current, updates).map_err(|source| BootstrapError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, updated.as_bytes(), Some(0o600))
        .await
        .map_err(|source| BootstrapError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Read one variable from an env file. A missing file reads as absent.
pub async fn read_env_var(path: &Path, key: &str) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(envfile::read_var(&contents, key)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_atomic_creates_parents_and_replaces() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a/b/file.txt");

        write_atomic(&path, b"one", None).await.unwrap();
        write_atomic(&path, b"two", None).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn update_env_file_creates_and_preserves() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(&path, "# header\nOTHER=1\nOPENEMR_CLIENT_ID=old\n").unwrap();

        update_env_file(
            &path,
            &[("OPENEMR_CLIENT_ID", "new"), ("OPENEMR_CLIENT_SECRET", "sec")],
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# header\nOTHER=1\nOPENEMR_CLIENT_ID=new\nOPENEMR_CLIENT_SECRET=sec\n"
        );
        assert_eq!(
            read_env_var(&path, "OPENEMR_CLIENT_SECRET").await.unwrap().as_deref(),
            Some("sec")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn update_env_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        update_env_file(&path, &[("A", "1")]).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn update_env_file_rejects_multiline_values_untouched() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        std::fs::write(&path, "A=1\n").unwrap();

        let err = update_env_file(&path, &[("A", "x\ny")]).await.unwrap_err();

        assert!(matches!(err, BootstrapError::EnvFile { .. }));
        assert_eq!(err.class(), coldstart_core::ErrorClass::FatalMisconfiguration);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=1\n");
    }

    #[tokio::test]
    async fn read_env_var_missing_file_is_none() {
        let temp = tempdir().unwrap();
        assert_eq!(read_env_var(&temp.path().join("nope"), "A").await.unwrap(), None);
    }
}
