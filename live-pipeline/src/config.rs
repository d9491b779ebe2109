use camera_stream::CameraOptions;
use segment_mux::{ContainerFormat, MuxerOptions, SegmentType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stream_encryption::EncryptionConfig;

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory the manifest and segments are written to
    pub directory: PathBuf,
    /// Output container format
    pub format: ContainerFormat,
    /// Camera capture settings
    #[serde(default)]
    pub camera: CameraOptions,
    /// Segment length target duration in seconds (default: 2)
    #[serde(default = "default_segment_time")]
    pub segment_time: u32,
    /// Maximum number of playlist entries (default: 10)
    #[serde(default = "default_playlist_size")]
    pub playlist_size: u32,
    /// Number of segments kept on disk before removal (default: 10)
    #[serde(default = "default_storage_size")]
    pub storage_size: u32,
    /// Segment container for HLS output (default: mpegts)
    #[serde(default)]
    pub segment_type: SegmentType,
    /// Segment encryption; `None` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionConfig>,
}

fn default_segment_time() -> u32 {
    2
}

fn default_playlist_size() -> u32 {
    10
}

fn default_storage_size() -> u32 {
    10
}

impl PipelineConfig {
    /// Create a config with defaults for everything but the target.
    pub fn new(directory: PathBuf, format: ContainerFormat) -> Self {
        Self {
            directory,
            format,
            camera: CameraOptions::default(),
            segment_time: default_segment_time(),
            playlist_size: default_playlist_size(),
            storage_size: default_storage_size(),
            segment_type: SegmentType::default(),
            encryption: None,
        }
    }

    /// Check cross-field invariants.
    ///
    /// Retention must cover the playlist window; otherwise segments still
    /// referenced by a served manifest could be deleted out from under a
    /// player.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_size < self.playlist_size {
            return Err(ConfigError::RetentionTooSmall {
                storage: self.storage_size,
                playlist: self.playlist_size,
            });
        }
        Ok(())
    }

    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the manifest file the muxer will maintain.
    pub fn manifest_path(&self) -> PathBuf {
        self.directory.join(self.format.manifest_name())
    }

    pub(crate) fn muxer_options(&self, key_info_file: Option<PathBuf>) -> MuxerOptions {
        MuxerOptions {
            format: self.format,
            fps: self.camera.fps,
            segment_time: self.segment_time,
            playlist_size: self.playlist_size,
            storage_size: self.storage_size,
            segment_type: self.segment_type,
            key_info_file,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("storage size {storage} is smaller than the playlist size {playlist}; segments still listed in the manifest would be deleted")]
    RetentionTooSmall { storage: u32, playlist: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn retention_must_cover_playlist_window() {
        let mut config = PipelineConfig::new(PathBuf::from("camera"), ContainerFormat::Hls);
        config.playlist_size = 10;
        config.storage_size = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RetentionTooSmall {
                storage: 5,
                playlist: 10
            })
        ));

        config.storage_size = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn manifest_path_follows_format() {
        let hls = PipelineConfig::new(PathBuf::from("camera"), ContainerFormat::Hls);
        assert_eq!(hls.manifest_path(), PathBuf::from("camera/livestream.m3u8"));

        let dash = PipelineConfig::new(PathBuf::from("camera"), ContainerFormat::Dash);
        assert_eq!(dash.manifest_path(), PathBuf::from("camera/livestream.mpd"));
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.toml");

        let mut config = PipelineConfig::new(PathBuf::from("camera"), ContainerFormat::Dash);
        config.camera.horizontal_flip = true;
        config.encryption = Some(stream_encryption::EncryptionConfig {
            public_base_url: Some("https://cam.example.com".to_string()),
            ..Default::default()
        });
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.format, ContainerFormat::Dash);
        assert!(loaded.camera.horizontal_flip);
        let enc = loaded.encryption.expect("encryption kept");
        assert_eq!(
            enc.public_base_url.as_deref(),
            Some("https://cam.example.com")
        );
        assert_eq!(enc.key_file_name, "enc.key");
    }

    #[test]
    fn load_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.toml");
        std::fs::write(&path, "directory = \"camera\"\nformat = \"webm\"\n").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn load_rejects_undersized_retention() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.toml");
        std::fs::write(
            &path,
            "directory = \"camera\"\nformat = \"hls\"\nplaylist_size = 10\nstorage_size = 2\n",
        )
        .unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::RetentionTooSmall { .. })
        ));
    }
}
