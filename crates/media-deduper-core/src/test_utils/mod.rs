use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use crate::processing::{Fingerprint, Fingerprinter};
use crate::types::{FileRecord, MediaKind};

/// Write a small placeholder media file
pub fn create_test_file(dir: &Path, name: &str) -> PathBuf {
    let file_path = dir.join(name);
    let mut file = File::create(&file_path).unwrap();
    file.write_all(b"DUMMY IMAGE DATA").unwrap();
    file_path
}

/// A cache record with fixed timestamps
pub fn sample_record(path: &str, fingerprint: u64, size_bytes: u64) -> FileRecord {
    let path = PathBuf::from(path);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = Utc.timestamp_nanos(1_700_000_000_123_456_789);

    FileRecord {
        path,
        filename,
        kind: MediaKind::Image,
        size_bytes,
        width: Some(640),
        height: Some(480),
        created_at: stamp,
        modified_at: stamp,
        fingerprint: Fingerprint::from_u64(fingerprint),
        scan_date: stamp,
    }
}

/// Returns a preset fingerprint per file name and counts calls.
///
/// Names without a preset fail like an undecodable file.
#[derive(Default)]
pub struct StubFingerprinter {
    presets: HashMap<String, u64>,
    calls: AtomicUsize,
}

impl StubFingerprinter {
    pub fn with(mut self, filename: &str, fingerprint: u64) -> Self {
        self.presets.insert(filename.to_string(), fingerprint);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fingerprinter for StubFingerprinter {
    fn fingerprint(&self, meta: &FileMetadata) -> Result<Fingerprint> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.presets
            .get(&meta.filename)
            .map(|&value| Fingerprint::from_u64(value))
            .ok_or_else(|| Error::decode(&meta.path, "no preset fingerprint"))
    }
}
