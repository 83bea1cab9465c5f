use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the media-deduper library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Fingerprint cache store error
    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// The cache store exists but failed its integrity check
    #[error("Cache store is corrupt: {0}")]
    CacheCorrupt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Scan root does not exist
    #[error("Scan root not found: {0}")]
    RootNotFound(PathBuf),

    /// Scan root is a file, not a directory
    #[error("Scan root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Scan root exists but cannot be listed
    #[error("Scan root {path} is not readable: {reason}")]
    RootUnreadable { path: PathBuf, reason: String },

    /// Another scan holds the single-flight slot
    #[error("A scan is already in progress for {0}")]
    ScanInProgress(PathBuf),

    /// Cancellation was requested but nothing is running
    #[error("No scan is running")]
    NoScanRunning,

    /// Deletion target resolves outside the scanned root
    #[error("{path} is outside of scanned directory {root}")]
    OutsideScanRoot { path: PathBuf, root: PathBuf },

    /// File exceeds the configured size ceiling
    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Decoder could not produce pixels for the file
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// ffmpeg/ffprobe binaries could not be executed
    #[error("ffmpeg is not available ({0}); video files cannot be fingerprinted")]
    FfmpegUnavailable(String),

    /// Unsupported media format
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),

    /// Threshold outside 0..=fingerprint bits
    #[error("Threshold {threshold} is out of range (0..={max})")]
    InvalidThreshold { threshold: u32, max: u32 },

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Build a decode error for `path` from anything printable
    pub fn decode(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
