//! Core functionality for finding and managing near-duplicate media.
//!
//! This library provides the foundational components for media deduplication:
//! - File discovery and metadata extraction
//! - Perceptual fingerprinting of images and video frames
//! - A persistent fingerprint cache keyed by path and modification time
//! - Background scanning with progress reporting and cancellation
//! - Pairwise duplicate detection
//! - Safe file deletion confined to the scanned root

// -- External Dependencies --

use crossbeam::channel::Receiver;
use log::info;

// -- Standard Library --
use std::path::{Path, PathBuf};
use std::sync::Arc;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use processing::{Fingerprint, Fingerprinter, PerceptualFingerprinter};
pub use scanning::{ScanEvent, ScanRequest, ScanStatus};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod deduplication;
pub mod discovery;
pub mod logging;
pub mod metadata;
pub mod persistence;
pub mod processing;
pub mod safety;
pub mod scanning;
pub mod types;

// -- Test Modules --
#[cfg(test)]
pub mod test_utils;

use persistence::FingerprintCache;
use safety::{FileRemover, SafetyManager};
use scanning::{ScanCoordinator, Scanner};

/// Main entry point: one cache, one scan slot, and the queries over them
pub struct MediaDeduper {
    config: Config,
    cache: Arc<FingerprintCache>,
    scanner: Arc<Scanner>,
    coordinator: ScanCoordinator,
    safety_manager: SafetyManager,
}

impl MediaDeduper {
    /// Create a new MediaDeduper with the cache at `config.database_path`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let cache = FingerprintCache::open(&config.database_path, &config)?;
        Self::with_cache(config, cache)
    }

    /// Create a MediaDeduper over an already opened cache
    pub fn with_cache(config: Config, cache: FingerprintCache) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(cache);
        let fingerprinter: Arc<dyn Fingerprinter> = Arc::new(PerceptualFingerprinter::new(&config));

        Ok(Self {
            scanner: Arc::new(Scanner::new(&config, cache.clone(), fingerprinter)),
            coordinator: ScanCoordinator::new(),
            safety_manager: SafetyManager::new(cache.clone()),
            cache,
            config,
        })
    }

    /// Replace the fingerprinting backend
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.scanner = Arc::new(Scanner::new(&self.config, self.cache.clone(), fingerprinter));
        self
    }

    /// Replace the file removal backend used by [`MediaDeduper::delete_file`]
    pub fn with_file_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.safety_manager = SafetyManager::new(self.cache.clone()).with_remover(remover);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a background scan; see [`ScanCoordinator::start`]
    pub fn start_scan(&self, request: ScanRequest) -> Result<ScanStatus> {
        self.coordinator.start(self.scanner.clone(), request)
    }

    /// Snapshot of the current or most recent scan
    pub fn scan_status(&self) -> ScanStatus {
        self.coordinator.status()
    }

    /// Request cancellation of the running scan
    pub fn cancel_scan(&self) -> Result<()> {
        self.coordinator.cancel()
    }

    /// Block until the running scan finishes and return its final status
    pub fn wait_for_scan(&self) -> ScanStatus {
        self.coordinator.wait()
    }

    /// Receive scan events from now on
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.coordinator.subscribe()
    }

    /// Find near-duplicate pairs among cached files under `root`.
    ///
    /// `threshold` and `filter` default to the last scan's values, then to
    /// the configured threshold and both media kinds.
    pub fn find_duplicates(
        &self,
        root: &Path,
        threshold: Option<u32>,
        filter: Option<MediaFilter>,
    ) -> Result<DuplicateReport> {
        let last = self.coordinator.status();
        let threshold = threshold
            .or(last.threshold)
            .unwrap_or(self.config.default_threshold);
        let filter = filter.unwrap_or(last.media_filter);
        let bits = self.config.fingerprint_bits();
        deduplication::validate_threshold(threshold, bits)?;

        let root = safety::resolve_path(root)?;
        let records: Vec<FileRecord> = self
            .cache
            .list_under(&root)?
            .into_iter()
            .filter(|r| filter.includes(r.kind))
            .collect();

        let pairs = deduplication::find_duplicate_pairs(records, threshold, bits);
        let report = deduplication::build_report(pairs);
        info!(
            "Found {} duplicate pairs under {} (threshold {})",
            report.total_pairs,
            root.display(),
            threshold
        );
        Ok(report)
    }

    /// Delete a file inside `scan_root` and drop its cache record
    pub fn delete_file(&self, path: &Path, scan_root: &Path) -> Result<PathBuf> {
        self.safety_manager.delete_file(path, scan_root)
    }

    /// Aggregate counts over the whole cache
    pub fn stats(&self) -> Result<CacheStats> {
        self.cache.stats()
    }

    /// Remove every cached record; returns how many were removed
    pub fn clear_cache(&self) -> Result<usize> {
        self.cache.clear()
    }
}
