//! Segment encryption key provisioning.
//!
//! HLS segment encryption uses a single AES-128 key for the whole run: the
//! key file and a key-info descriptor are written into the output directory
//! once, before the muxer starts, and the muxer references the descriptor
//! as a launch argument. Regenerating the key mid-stream would invalidate
//! segments already referenced by a served playlist, so there is no
//! rotation.
//!
//! The key-info file is three lines: the public URL players fetch the key
//! from (empty when no base URL is configured), the local key file path the
//! muxer reads, and the hex-encoded initialization vector.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// Initialization vector length in bytes (hex-encoded on disk).
pub const IV_LEN: usize = 16;

/// Configuration for segment encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Public base URL the key file is served from. When unset the key-info
    /// URL line is left empty and players resolve the key relative to the
    /// playlist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Key file name inside the output directory
    #[serde(default = "default_key_file_name")]
    pub key_file_name: String,
    /// Key-info file name inside the output directory
    #[serde(default = "default_key_info_file_name")]
    pub key_info_file_name: String,
}

fn default_key_file_name() -> String {
    "enc.key".to_string()
}

fn default_key_info_file_name() -> String {
    "enc.keyinfo".to_string()
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            public_base_url: None,
            key_file_name: default_key_file_name(),
            key_info_file_name: default_key_info_file_name(),
        }
    }
}

/// Key material provisioned for one pipeline run.
#[derive(Debug, Clone)]
pub struct EncryptionMaterial {
    /// Path of the raw key file
    pub key_path: PathBuf,
    /// Path of the key-info descriptor handed to the muxer
    pub key_info_path: PathBuf,
    /// Hex-encoded initialization vector
    pub iv_hex: String,
}

/// Generate key material and persist it into `directory`.
///
/// Files left over from an earlier run are overwritten. Both files are
/// flushed to disk before this returns, since the muxer reads the key-info
/// path as a launch argument rather than as a stream.
pub async fn provision(
    directory: &Path,
    config: &EncryptionConfig,
) -> Result<EncryptionMaterial, EncryptionError> {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let iv_hex = hex::encode(iv);

    let key_path = directory.join(&config.key_file_name);
    write_durable(&key_path, &key).await?;

    // ffmpeg resolves the key path from its working directory, so the
    // descriptor carries an absolute path.
    let local_key_path = key_path
        .canonicalize()
        .map_err(|source| EncryptionError::Write {
            path: key_path.clone(),
            source,
        })?;

    let url_line = match &config.public_base_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), config.key_file_name),
        None => String::new(),
    };
    let key_info = format!("{}\n{}\n{}\n", url_line, local_key_path.display(), iv_hex);

    let key_info_path = directory.join(&config.key_info_file_name);
    write_durable(&key_info_path, key_info.as_bytes()).await?;

    tracing::info!(
        key = %key_path.display(),
        key_info = %key_info_path.display(),
        "provisioned segment encryption"
    );

    Ok(EncryptionMaterial {
        key_path,
        key_info_path,
        iv_hex,
    })
}

async fn write_durable(path: &Path, contents: &[u8]) -> Result<(), EncryptionError> {
    let write = async {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    };

    write.await.map_err(|source| EncryptionError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("failed to write key material to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn provision_writes_key_and_descriptor() {
        let dir = tempdir().unwrap();
        let material = provision(dir.path(), &EncryptionConfig::default())
            .await
            .unwrap();

        let key = std::fs::read(&material.key_path).unwrap();
        assert_eq!(key.len(), KEY_LEN);

        let info = std::fs::read_to_string(&material.key_info_path).unwrap();
        let lines: Vec<&str> = info.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "");
        assert!(lines[1].ends_with("enc.key"));
        assert_eq!(lines[2], material.iv_hex);
    }

    #[tokio::test]
    async fn iv_is_hex_encoded() {
        let dir = tempdir().unwrap();
        let material = provision(dir.path(), &EncryptionConfig::default())
            .await
            .unwrap();
        assert_eq!(material.iv_hex.len(), IV_LEN * 2);
        assert!(material.iv_hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn public_base_url_fills_the_url_line() {
        let dir = tempdir().unwrap();
        let config = EncryptionConfig {
            public_base_url: Some("https://cam.example.com/".to_string()),
            ..EncryptionConfig::default()
        };
        let material = provision(dir.path(), &config).await.unwrap();

        let info = std::fs::read_to_string(&material.key_info_path).unwrap();
        assert_eq!(
            info.lines().next().unwrap(),
            "https://cam.example.com/enc.key"
        );
    }

    #[tokio::test]
    async fn reprovision_overwrites_previous_run() {
        let dir = tempdir().unwrap();
        let config = EncryptionConfig::default();

        let first = provision(dir.path(), &config).await.unwrap();
        let first_key = std::fs::read(&first.key_path).unwrap();

        let second = provision(dir.path(), &config).await.unwrap();
        let second_key = std::fs::read(&second.key_path).unwrap();

        assert_eq!(first.key_path, second.key_path);
        assert_eq!(second_key.len(), KEY_LEN);
        assert_ne!(first_key, second_key);
        assert_ne!(first.iv_hex, second.iv_hex);
    }

    #[tokio::test]
    async fn missing_directory_is_a_write_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = provision(&missing, &EncryptionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EncryptionError::Write { .. }));
    }
}
