use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::processing::perceptual::MAX_DCT_SIDE;
use crate::types::MediaKind;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for scanning, fingerprinting and comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Side of the low-frequency DCT block; fingerprints are `grid_size²` bits
    pub grid_size: u32,

    /// Oversampling factor: images are reduced to `grid_size * dct_factor`
    /// pixels per side before the DCT
    pub dct_factor: u32,

    /// Extensions (lowercase, no dot) treated as images
    pub image_extensions: BTreeSet<String>,

    /// Extensions (lowercase, no dot) treated as videos
    pub video_extensions: BTreeSet<String>,

    /// Files larger than this are skipped
    pub max_file_size_bytes: u64,

    /// Fraction of a video's duration where the fingerprint frame is taken
    pub video_frame_position: f64,

    /// Hamming distance used when a query does not name one
    pub default_threshold: u32,

    /// Maximum directory depth for scanning
    pub max_depth: Option<usize>,

    /// Path to the fingerprint cache database
    pub database_path: PathBuf,

    /// ffmpeg binary used to grab video frames
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary used to read video duration and dimensions
    pub ffprobe_path: PathBuf,

    /// Log level
    pub log_level: LogLevel,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_size: 8,
            dct_factor: 4,
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            video_extensions: VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_file_size_bytes: 500 * 1024 * 1024,
            video_frame_position: 0.5,
            default_threshold: 5,
            max_depth: None,
            database_path: default_database_path(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            log_level: LogLevel::Info,
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// `<local data dir>/media-deduper/fingerprints.db`, or the working directory
/// when the platform has no data directory
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("media-deduper"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fingerprints.db")
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let mut config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;
        config.normalize_extensions();

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Lowercase extensions and drop leading dots, so `".JPG"` becomes `"jpg"`
    pub fn normalize_extensions(&mut self) {
        for set in [&mut self.image_extensions, &mut self.video_extensions] {
            *set = set.iter().map(|ext| normalize_extension(ext)).collect();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(2..=32).contains(&self.grid_size) {
            return Err(Error::Configuration(format!(
                "Grid size must be between 2 and 32 (got {})",
                self.grid_size
            )));
        }

        if self.dct_factor == 0 {
            return Err(Error::Configuration(
                "DCT factor must be at least 1".to_string(),
            ));
        }

        match self.grid_size.checked_mul(self.dct_factor) {
            Some(side) if side <= MAX_DCT_SIDE => {}
            _ => {
                return Err(Error::Configuration(format!(
                    "Grid size times DCT factor must be at most {} (got {} x {})",
                    MAX_DCT_SIDE, self.grid_size, self.dct_factor
                )))
            }
        }

        if !(0.0..=1.0).contains(&self.video_frame_position) {
            return Err(Error::Configuration(format!(
                "Video frame position must be between 0.0 and 1.0 (got {})",
                self.video_frame_position
            )));
        }

        if self.default_threshold > self.fingerprint_bits() {
            return Err(Error::Configuration(format!(
                "Default threshold {} exceeds the {}-bit fingerprint",
                self.default_threshold,
                self.fingerprint_bits()
            )));
        }

        if self.image_extensions.is_empty() && self.video_extensions.is_empty() {
            return Err(Error::Configuration(
                "At least one supported extension is required".to_string(),
            ));
        }

        if let Some(ext) = self
            .image_extensions
            .iter()
            .chain(&self.video_extensions)
            .find(|ext| ext.is_empty() || normalize_extension(ext) != **ext)
        {
            return Err(Error::Configuration(format!(
                "Extension '{}' must be lowercase without a leading dot",
                ext
            )));
        }

        if let Some(ext) = self
            .image_extensions
            .intersection(&self.video_extensions)
            .next()
        {
            return Err(Error::Configuration(format!(
                "Extension '{}' is listed as both image and video",
                ext
            )));
        }

        if self.max_file_size_bytes == 0 {
            return Err(Error::Configuration(
                "Maximum file size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of bits in a fingerprint produced under this configuration
    pub fn fingerprint_bits(&self) -> u32 {
        self.grid_size * self.grid_size
    }

    /// Classify a path by its extension
    pub fn media_kind(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if self.image_extensions.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fingerprint_bits(), 64);
    }

    #[test]
    fn test_media_kind_by_extension() {
        let config = Config::default();
        assert_eq!(config.media_kind(Path::new("a.JPG")), Some(MediaKind::Image));
        assert_eq!(config.media_kind(Path::new("clip.mkv")), Some(MediaKind::Video));
        assert_eq!(config.media_kind(Path::new("notes.txt")), None);
        assert_eq!(config.media_kind(Path::new("README")), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.video_frame_position = 1.5;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.default_threshold = 65;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.grid_size = 1;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.video_extensions.insert("png".to_string());
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.dct_factor = 1 << 30;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.grid_size = 32;
        config.dct_factor = 16;
        assert!(config.validate().is_ok());
        config.dct_factor = 17;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unnormalized_extensions_are_rejected() {
        for bad in [".jpg", "JPG", ""] {
            let mut config = Config::default();
            config.image_extensions.insert(bad.to_string());
            assert!(
                matches!(config.validate(), Err(Error::Configuration(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_loaded_extensions_are_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extensions.json");
        std::fs::write(
            &path,
            r#"{ "image_extensions": [".JPG", "Png"], "video_extensions": [".mp4"] }"#,
        )
        .unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.validate().is_ok());
        assert_eq!(loaded.media_kind(Path::new("a.jpg")), Some(MediaKind::Image));
        assert_eq!(loaded.media_kind(Path::new("b.PNG")), Some(MediaKind::Image));
        assert_eq!(loaded.media_kind(Path::new("c.mp4")), Some(MediaKind::Video));
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media-deduper.json");

        let mut config = Config::default();
        config.grid_size = 16;
        config.default_threshold = 20;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.grid_size, 16);
        assert_eq!(loaded.default_threshold, 20);
        assert_eq!(loaded.image_extensions, config.image_extensions);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "default_threshold": 9 }"#).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.default_threshold, 9);
        assert_eq!(loaded.grid_size, 8);
    }
}
