//! On-disk secret key.
//!
//! The file holds the hex-encoded 32-byte Ed25519 seed and nothing else.
//! Loading never creates it: the caller saves a fresh key only once the
//! server has registered it, so a failed registration leaves no file behind
//! and the next run registers again.

use std::{io, path::Path};

use thiserror::Error;
use vex_core::{AuthError, Ed25519Keyring, Keyring};

/// Key file failures.
#[derive(Debug, Error)]
pub enum KeyFileError {
    /// The file could not be read or written.
    #[error("key file {path}: {source}")]
    Io {
        /// Offending path
        path: String,
        /// Underlying error
        source: io::Error,
    },

    /// The file does not hold a valid secret key.
    #[error("key file {path}: {source}")]
    Invalid {
        /// Offending path
        path: String,
        /// Why the key was rejected
        source: AuthError,
    },
}

/// Reads the secret key at `path`, or `None` if there is no file.
pub async fn load(path: &Path) -> Result<Option<Ed25519Keyring>, KeyFileError> {
    match tokio::fs::read_to_string(path).await {
        Ok(secret) => Ed25519Keyring::from_hex(&secret)
            .map(Some)
            .map_err(|source| KeyFileError::Invalid { path: path.display().to_string(), source }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(KeyFileError::Io { path: path.display().to_string(), source }),
    }
}

/// Writes the secret key to `path`, readable by the owner only.
pub async fn save(path: &Path, keyring: &Ed25519Keyring) -> Result<(), KeyFileError> {
    write_private(path, hex::encode(keyring.private_key()).as_bytes())
        .await
        .map_err(|source| KeyFileError::Io { path: path.display().to_string(), source })
}

async fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none_and_is_not_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vex.key");

        assert!(load(&path).await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn saved_key_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vex.key");
        let keyring = Ed25519Keyring::from_secret([3; 32]);

        save(&path, &keyring).await.unwrap();
        let loaded = load(&path).await.unwrap().unwrap();

        assert_eq!(loaded.public_key_hex(), keyring.public_key_hex());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("vex.key");
        save(&path, &Ed25519Keyring::from_secret([4; 32])).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vex.key");
        std::fs::write(&path, "not a key").unwrap();

        assert!(matches!(load(&path).await, Err(KeyFileError::Invalid { .. })));
    }
}
