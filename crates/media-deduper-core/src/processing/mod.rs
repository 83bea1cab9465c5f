pub mod perceptual;
pub mod types;
pub mod video;

use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use crate::types::MediaKind;

pub use perceptual::fingerprint_image;
pub use types::Fingerprint;

/// Turns a media file into a fingerprint.
///
/// Implementations are shared with the scan worker thread.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, meta: &FileMetadata) -> Result<Fingerprint>;
}

/// pHash of the whole image, or of one frame for videos
#[derive(Debug, Clone)]
pub struct PerceptualFingerprinter {
    grid_size: u32,
    dct_factor: u32,
    frame_position: f64,
    ffmpeg_path: std::path::PathBuf,
}

impl PerceptualFingerprinter {
    pub fn new(config: &Config) -> Self {
        Self {
            grid_size: config.grid_size,
            dct_factor: config.dct_factor,
            frame_position: config.video_frame_position,
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }

    fn fingerprint_image_file(&self, path: &Path) -> Result<Fingerprint> {
        // Sniff the content so misnamed files still decode
        let img = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| Error::decode(path, e))?;
        Ok(fingerprint_image(&img, self.grid_size, self.dct_factor))
    }

    fn fingerprint_video_file(&self, meta: &FileMetadata) -> Result<Fingerprint> {
        let duration = match meta.duration_secs {
            Some(duration) => Some(duration),
            None => video::ffmpeg_duration(&self.ffmpeg_path, &meta.path)?,
        };

        // Without a duration only the very first frame can be addressed
        let offset = match duration {
            Some(_) => video::seek_offset(duration, self.frame_position),
            None if self.frame_position == 0.0 => 0.0,
            None => {
                return Err(Error::decode(
                    &meta.path,
                    format!(
                        "unknown duration, cannot seek to {:.0}% of the video",
                        self.frame_position * 100.0
                    ),
                ))
            }
        };
        let frame = video::extract_frame(&self.ffmpeg_path, &meta.path, offset)?;
        Ok(fingerprint_image(&frame, self.grid_size, self.dct_factor))
    }
}

impl Fingerprinter for PerceptualFingerprinter {
    fn fingerprint(&self, meta: &FileMetadata) -> Result<Fingerprint> {
        match meta.kind {
            MediaKind::Image => self.fingerprint_image_file(&meta.path),
            MediaKind::Video => self.fingerprint_video_file(meta),
        }
    }
}
