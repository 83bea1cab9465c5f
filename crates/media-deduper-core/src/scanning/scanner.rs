use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::discovery::{discover_media, DiscoveredFile};
use crate::error::{Error, Result};
use crate::logging::log_fingerprint_error;
use crate::metadata::{Extraction, MetadataExtractor};
use crate::persistence::FingerprintCache;
use crate::processing::Fingerprinter;
use crate::types::{FileRecord, MediaFilter};

use super::state::{FileOutcome, ScanProgress};

/// Walks a root, reuses fresh cache rows and fingerprints the rest
pub struct Scanner {
    config: Config,
    cache: Arc<FingerprintCache>,
    extractor: MetadataExtractor,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl Scanner {
    pub fn new(
        config: &Config,
        cache: Arc<FingerprintCache>,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> Self {
        Self {
            config: config.clone(),
            cache,
            extractor: MetadataExtractor::new(config),
            fingerprinter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one full scan of an already validated `root`
    pub(crate) fn run(
        &self,
        root: &Path,
        filter: MediaFilter,
        clear_cache: bool,
        progress: &mut ScanProgress,
        cancel: &AtomicBool,
    ) {
        if clear_cache {
            if let Err(e) = self.cache.clear() {
                progress.record_error(format!("failed to clear cache: {}", e));
                return;
            }
        }

        let discovery = discover_media(root, &self.config, filter);
        for message in discovery.errors {
            progress.record_error(message);
        }
        progress.set_total(discovery.files.len());

        let mut seen = HashSet::with_capacity(discovery.files.len());
        for file in &discovery.files {
            if cancel.load(Ordering::SeqCst) {
                log::info!("Scan of {} cancelled", root.display());
                progress.mark_cancelled();
                return;
            }

            progress.begin_file(&file.path);
            seen.insert(file.path.clone());

            match self.process_file(file) {
                Ok(outcome) => progress.complete_file(outcome),
                Err(e) => {
                    // The cache is unusable, stop rather than lose results
                    log::error!("Cache failure while scanning {}: {}", file.path.display(), e);
                    progress.complete_file(FileOutcome::Failed(format!(
                        "{}: {}",
                        file.path.display(),
                        e
                    )));
                    progress.record_error(format!("scan aborted: cache store failure: {}", e));
                    return;
                }
            }
        }

        match self.prune_missing(root, &seen) {
            Ok(pruned) => progress.set_pruned(pruned),
            Err(e) => progress.record_error(format!("failed to prune stale records: {}", e)),
        }
    }

    /// Cache lookup then fingerprint on miss.
    ///
    /// Per-file problems become [`FileOutcome::Failed`]; only cache store
    /// errors come back as `Err`.
    fn process_file(&self, file: &DiscoveredFile) -> Result<FileOutcome> {
        let path = &file.path;

        let mut meta = match self.extractor.extract(path) {
            Ok(Extraction::Ready(meta)) => meta,
            Ok(Extraction::Skipped(reason)) => return Ok(FileOutcome::Skipped(reason)),
            Err(e) => return Ok(failed(path, &e)),
        };

        if let Some(cached) = self.cache.get(path)? {
            if cached.modified_at == meta.modified_at
                && cached.fingerprint.bit_len() == self.config.fingerprint_bits()
            {
                return Ok(FileOutcome::CacheHit);
            }
            log::debug!("Stale cache entry for {}", path.display());
        }

        self.extractor.probe_dimensions(&mut meta);
        let fingerprint = match self.fingerprinter.fingerprint(&meta) {
            Ok(fingerprint) => fingerprint,
            Err(e) => return Ok(failed(path, &e)),
        };

        self.cache.put(&FileRecord {
            path: meta.path,
            filename: meta.filename,
            kind: meta.kind,
            size_bytes: meta.size_bytes,
            width: meta.width,
            height: meta.height,
            created_at: meta.created_at,
            modified_at: meta.modified_at,
            fingerprint,
            scan_date: Utc::now(),
        })?;

        Ok(FileOutcome::Fingerprinted)
    }

    /// Drop rows under `root` for files that no longer exist
    fn prune_missing(&self, root: &Path, seen: &HashSet<PathBuf>) -> Result<usize> {
        let mut pruned = 0;
        for record in self.cache.list_under(root)? {
            if !seen.contains(&record.path) && !record.path.exists() {
                self.cache.delete(&record.path)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            log::info!("Pruned {} records for deleted files under {}", pruned, root.display());
        }
        Ok(pruned)
    }
}

fn failed(path: &Path, error: &Error) -> FileOutcome {
    log_fingerprint_error(path, error);
    FileOutcome::Failed(format!("{}: {}", path.display(), error))
}
