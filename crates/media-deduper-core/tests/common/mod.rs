#![allow(dead_code)]

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use media_deduper_core::metadata::FileMetadata;
use media_deduper_core::persistence::FingerprintCache;
use media_deduper_core::{Config, Error, Fingerprint, Fingerprinter, MediaDeduper, Result};

/// Fingerprints looked up by file name, with a call counter
#[derive(Default)]
pub struct FixedFingerprinter {
    presets: Mutex<HashMap<String, u64>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FixedFingerprinter {
    pub fn new(presets: &[(&str, u64)]) -> Self {
        Self {
            presets: Mutex::new(
                presets
                    .iter()
                    .map(|(name, value)| (name.to_string(), *value))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep in every call so scans stay observable
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, name: &str, value: u64) {
        self.presets.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fingerprinter for FixedFingerprinter {
    fn fingerprint(&self, meta: &FileMetadata) -> Result<Fingerprint> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.presets
            .lock()
            .unwrap()
            .get(&meta.filename)
            .map(|&value| Fingerprint::from_u64(value))
            .ok_or_else(|| Error::decode(&meta.path, "unreadable test file"))
    }
}

/// Config whose cache lives inside `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.database_path = dir.join("cache").join("fingerprints.db");
    config
}

/// A deduper whose cache lives in `cache_dir`, using a fixed fingerprinter
pub fn deduper_with(
    cache_dir: &Path,
    fingerprinter: Arc<FixedFingerprinter>,
) -> MediaDeduper {
    MediaDeduper::new(test_config(cache_dir))
        .unwrap()
        .with_fingerprinter(fingerprinter)
}

/// A deduper with an in-memory cache and the real perceptual fingerprinter
pub fn perceptual_deduper() -> MediaDeduper {
    let config = Config::default();
    let cache = FingerprintCache::open_in_memory(&config).unwrap();
    MediaDeduper::with_cache(config, cache).unwrap()
}

/// Write placeholder bytes; content is irrelevant with a fixed fingerprinter
pub fn write_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0x5Au8; size]).unwrap();
    path
}

/// Smooth synthetic photo; different seeds give unrelated pictures
pub fn synthetic_photo(width: u32, height: u32, seed: u32) -> DynamicImage {
    let s = seed as f64;
    let img = RgbImage::from_fn(width, height, |x, y| {
        let fx = x as f64 / width as f64;
        let fy = y as f64 / height as f64;
        let v = 128.0
            + 55.0 * (TAU * ((1.1 + 0.37 * s) * fx + (0.3 + 0.21 * s) * fy) + s).sin()
            + 45.0 * (TAU * ((0.6 + 0.13 * s) * fx - (1.7 - 0.19 * s) * fy)).cos()
            + 25.0 * (TAU * (2.3 + 0.5 * s) * fx * fy).sin();
        let v = v.clamp(0.0, 255.0) as u8;
        Rgb([v, v / 2 + 50, 255 - v])
    });
    DynamicImage::ImageRgb8(img)
}

/// Canonical form of a temp directory (macOS temp paths are symlinks)
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}
