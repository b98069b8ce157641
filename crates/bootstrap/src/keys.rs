//! Authorization-server key material on the local filesystem.

use coldstart_core::config::KeysConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Remove a file, treating "already gone" as success. Returns whether it existed.
async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Delete every file below `dir`, keeping the directory tree itself.
async fn clear_tree(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if remove_if_present(&entry.path()).await? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Delete the key pair and every per-method auxiliary key file.
///
/// Idempotent: files that are already absent are skipped. Returns the number
/// of files removed.
pub async fn clear_key_files(config: &KeysConfig) -> std::io::Result<usize> {
    let mut removed = 0;
    for path in [&config.private_key, &config.public_key] {
        if remove_if_present(path).await? {
            removed += 1;
        }
    }
    removed += clear_tree(&config.methods_dir).await?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys_config(root: &Path) -> KeysConfig {
        KeysConfig {
            private_key: root.join("certificates/oaprivate.key"),
            public_key: root.join("certificates/oapublic.key"),
            methods_dir: root.join("methods"),
            remediation_attempts: 3,
        }
    }

    #[tokio::test]
    async fn clears_pair_and_nested_method_files() {
        let temp = tempdir().unwrap();
        let config = keys_config(temp.path());
        std::fs::create_dir_all(temp.path().join("certificates")).unwrap();
        std::fs::create_dir_all(config.methods_dir.join("nested")).unwrap();
        std::fs::write(&config.private_key, "priv").unwrap();
        std::fs::write(&config.public_key, "pub").unwrap();
        std::fs::write(config.methods_dir.join("one"), "1").unwrap();
        std::fs::write(config.methods_dir.join("nested/two"), "2").unwrap();

        assert_eq!(clear_key_files(&config).await.unwrap(), 4);

        assert!(!config.private_key.exists());
        assert!(!config.public_key.exists());
        assert!(config.methods_dir.join("nested").is_dir());
        assert!(!config.methods_dir.join("nested/two").exists());
    }

    #[tokio::test]
    async fn clearing_absent_files_is_a_no_op() {
        let temp = tempdir().unwrap();
        let config = keys_config(temp.path());

        assert_eq!(clear_key_files(&config).await.unwrap(), 0);
        assert_eq!(clear_key_files(&config).await.unwrap(), 0);
    }
}
