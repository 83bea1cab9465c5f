use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::processing::video;
use crate::types::MediaKind;

/// Filesystem facts about a media file, plus dimensions once probed
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub filename: String,
    pub kind: MediaKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Videos only, when ffprobe reported it
    pub duration_secs: Option<f64>,
}

/// Result of looking at a single file
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Eligible for fingerprinting
    Ready(FileMetadata),
    /// Not an error, but not fingerprinted either
    Skipped(String),
}

/// Reads size, timestamps and dimensions of media files
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    config: Config,
}

impl MetadataExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Stat a file and apply the size gate.
    ///
    /// Only touches filesystem metadata so cache hits stay cheap; dimensions
    /// are filled in later by [`MetadataExtractor::probe_dimensions`].
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        let link_meta = fs::symlink_metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        if link_meta.file_type().is_symlink() {
            return Ok(Extraction::Skipped(format!(
                "{}: symbolic links are not followed",
                path.display()
            )));
        }
        if !link_meta.is_file() {
            return Ok(Extraction::Skipped(format!(
                "{}: not a regular file",
                path.display()
            )));
        }

        let kind = self
            .config
            .media_kind(path)
            .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?;

        let size_bytes = link_meta.len();
        if size_bytes > self.config.max_file_size_bytes {
            let reason = Error::FileTooLarge {
                path: path.to_path_buf(),
                size: size_bytes,
                limit: self.config.max_file_size_bytes,
            };
            return Ok(Extraction::Skipped(reason.to_string()));
        }

        let modified_at: DateTime<Utc> = link_meta.modified()?.into();
        // Creation time is not available on every filesystem
        let created_at = link_meta
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modified_at);

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Extraction::Ready(FileMetadata {
            path: path.to_path_buf(),
            filename,
            kind,
            size_bytes,
            created_at,
            modified_at,
            width: None,
            height: None,
            duration_secs: None,
        }))
    }

    /// Fill in width, height and (for videos) duration.
    ///
    /// Missing dimensions never fail a file; the fingerprinter reports real
    /// decode problems.
    pub fn probe_dimensions(&self, meta: &mut FileMetadata) {
        match meta.kind {
            MediaKind::Image => match image::image_dimensions(&meta.path) {
                Ok((width, height)) => {
                    meta.width = Some(width);
                    meta.height = Some(height);
                }
                Err(e) => log::debug!(
                    "Could not read dimensions of {}: {}",
                    meta.path.display(),
                    e
                ),
            },
            MediaKind::Video => match video::probe(&self.config.ffprobe_path, &meta.path) {
                Ok(probe) => {
                    meta.width = probe.width;
                    meta.height = probe.height;
                    meta.duration_secs = probe.duration_secs;
                }
                Err(e) => log::debug!("ffprobe failed for {}: {}", meta.path.display(), e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_test_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let file_path = dir.join(name);
        let mut file = File::create(&file_path).unwrap();
        file.write_all(bytes).unwrap();
        file_path
    }

    #[test]
    fn test_extract_reads_size_and_kind() {
        let dir = tempdir().unwrap();
        let path = create_test_file(dir.path(), "photo.jpg", b"DUMMY IMAGE DATA");

        let extractor = MetadataExtractor::new(&Config::default());
        let Extraction::Ready(meta) = extractor.extract(&path).unwrap() else {
            panic!("expected a ready file");
        };

        assert_eq!(meta.filename, "photo.jpg");
        assert_eq!(meta.kind, MediaKind::Image);
        assert_eq!(meta.size_bytes, 16);
        assert!(meta.width.is_none());
    }

    #[test]
    fn test_oversized_file_is_skipped() {
        let dir = tempdir().unwrap();
        let path = create_test_file(dir.path(), "big.mp4", &[0u8; 2048]);

        let mut config = Config::default();
        config.max_file_size_bytes = 1024;
        let extractor = MetadataExtractor::new(&config);

        match extractor.extract(&path).unwrap() {
            Extraction::Skipped(reason) => assert!(reason.contains("2048")),
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let extractor = MetadataExtractor::new(&Config::default());
        assert!(matches!(
            extractor.extract(&dir.path().join("gone.png")),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_unsupported_extension_is_an_error() {
        let dir = tempdir().unwrap();
        let path = create_test_file(dir.path(), "notes.txt", b"text");
        let extractor = MetadataExtractor::new(&Config::default());
        assert!(matches!(
            extractor.extract(&path),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_skipped() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let target = create_test_file(outside.path(), "real.png", b"DUMMY IMAGE DATA");
        let link = dir.path().join("link.png");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let extractor = MetadataExtractor::new(&Config::default());
        assert!(matches!(
            extractor.extract(&link).unwrap(),
            Extraction::Skipped(_)
        ));
    }

    #[test]
    fn test_probe_dimensions_for_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        RgbImage::from_pixel(12, 7, Rgb([10, 20, 30])).save(&path).unwrap();

        let extractor = MetadataExtractor::new(&Config::default());
        let Extraction::Ready(mut meta) = extractor.extract(&path).unwrap() else {
            panic!("expected a ready file");
        };
        extractor.probe_dimensions(&mut meta);

        assert_eq!(meta.width, Some(12));
        assert_eq!(meta.height, Some(7));
    }

    #[test]
    fn test_probe_dimensions_tolerates_garbage() {
        let dir = tempdir().unwrap();
        let path = create_test_file(dir.path(), "broken.png", b"DUMMY IMAGE DATA");

        let extractor = MetadataExtractor::new(&Config::default());
        let Extraction::Ready(mut meta) = extractor.extract(&path).unwrap() else {
            panic!("expected a ready file");
        };
        extractor.probe_dimensions(&mut meta);
        assert!(meta.width.is_none());
    }
}
