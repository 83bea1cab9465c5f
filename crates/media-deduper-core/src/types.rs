use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::processing::Fingerprint;

/// Kind of media a file holds, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Which media kinds a scan or a duplicate query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    Image,
    Video,
    #[default]
    Both,
}

impl MediaFilter {
    /// Check if a kind passes this filter
    pub fn includes(&self, kind: MediaKind) -> bool {
        match self {
            Self::Both => true,
            Self::Image => kind == MediaKind::Image,
            Self::Video => kind == MediaKind::Video,
        }
    }
}

impl FromStr for MediaFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "file type must be 'image', 'video', or 'both' (got '{}')",
                other
            )),
        }
    }
}

/// One cached row per scanned file.
///
/// `fingerprint` describes the content observed at `modified_at`. A row whose
/// `modified_at` differs from the file's current modification time is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path, unique key in the cache
    pub path: PathBuf,

    /// Final path component
    pub filename: String,

    /// Image or video
    pub kind: MediaKind,

    /// File size in bytes
    pub size_bytes: u64,

    /// Pixel width when the decoder could read it
    pub width: Option<u32>,

    /// Pixel height when the decoder could read it
    pub height: Option<u32>,

    /// Filesystem creation time (falls back to mtime where unsupported)
    pub created_at: DateTime<Utc>,

    /// Filesystem modification time the fingerprint was computed against
    pub modified_at: DateTime<Utc>,

    /// Perceptual fingerprint
    pub fingerprint: Fingerprint,

    /// When this row was last (re)computed
    pub scan_date: DateTime<Utc>,
}

/// Two distinct cached files within the similarity threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub file1: FileRecord,
    pub file2: FileRecord,

    /// Hamming distance between the fingerprints (0 = identical)
    pub similarity_score: u32,

    /// 100% = identical
    pub similarity_percentage: f64,
}

impl DuplicatePair {
    /// Bytes recovered by deleting the smaller file of the pair
    pub fn potential_savings(&self) -> u64 {
        self.file1.size_bytes.min(self.file2.size_bytes)
    }
}

/// Result of a duplicate query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub pairs: Vec<DuplicatePair>,
    pub total_pairs: usize,
    pub total_potential_savings_bytes: u64,
}

/// Aggregate counts over the fingerprint cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_files_cached: u64,
    pub total_images: u64,
    pub total_videos: u64,
    pub total_size_bytes: u64,
    pub cache_created_at: Option<DateTime<Utc>>,
}
