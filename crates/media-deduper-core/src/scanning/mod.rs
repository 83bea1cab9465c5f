mod scanner;
mod state;

pub use scanner::Scanner;
pub use state::{ScanEvent, ScanStatus};

use chrono::Utc;
use crossbeam::channel::Receiver;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::deduplication::validate_threshold;
use crate::discovery::validate_root;
use crate::error::{Error, Result};
use crate::types::MediaFilter;
use state::{ScanBoard, ScanProgress};

/// Parameters for one scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub filter: MediaFilter,
    /// Default threshold for duplicate queries after this scan
    pub threshold: Option<u32>,
    /// Empty the whole cache before scanning
    pub clear_cache: bool,
}

impl ScanRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: MediaFilter::Both,
            threshold: None,
            clear_cache: false,
        }
    }

    pub fn with_filter(mut self, filter: MediaFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }
}

struct ActiveScan {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Runs at most one scan at a time on a background thread
#[derive(Default)]
pub struct ScanCoordinator {
    board: ScanBoard,
    active: Mutex<Option<ActiveScan>>,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate the request and start scanning in the background.
    ///
    /// Returns the initial status once the worker is running. Fails without
    /// side effects when a scan is already running or the root is unusable.
    pub fn start(&self, scanner: Arc<Scanner>, request: ScanRequest) -> Result<ScanStatus> {
        let mut active = self.active();

        let current = self.board.snapshot();
        if current.is_scanning {
            return Err(Error::ScanInProgress(current.root_path.unwrap_or_default()));
        }

        let root = validate_root(&request.root)?;
        let bits = scanner.config().fingerprint_bits();
        let threshold = request
            .threshold
            .unwrap_or(scanner.config().default_threshold);
        validate_threshold(threshold, bits)?;

        // The previous worker has already closed its status
        if let Some(previous) = active.take() {
            if let Some(handle) = previous.handle {
                let _ = handle.join();
            }
        }

        self.board.reset(ScanStatus {
            is_scanning: true,
            root_path: Some(root.clone()),
            media_filter: request.filter,
            threshold: Some(threshold),
            start_time: Some(Utc::now()),
            ..Default::default()
        });
        self.board.publish(ScanEvent::Started { root: root.clone() });
        log::info!("Starting scan of {} ({:?})", root.display(), request.filter);

        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let mut progress = ScanProgress::new(self.board.clone());
        let filter = request.filter;
        let clear_cache = request.clear_cache;

        let spawned = thread::Builder::new()
            .name("media-scan".to_string())
            .spawn(move || {
                scanner.run(&root, filter, clear_cache, &mut progress, &worker_cancel);
                progress.finish();
            });

        match spawned {
            Ok(handle) => {
                *active = Some(ActiveScan {
                    cancel,
                    handle: Some(handle),
                });
                Ok(self.board.snapshot())
            }
            Err(e) => {
                // The closure and its progress handle were dropped, closing the scan
                Err(Error::Io(e))
            }
        }
    }

    /// Snapshot of the current or most recent scan
    pub fn status(&self) -> ScanStatus {
        self.board.snapshot()
    }

    /// Ask the running scan to stop after the file it is on
    pub fn cancel(&self) -> Result<()> {
        let active = self.active();
        match active.as_ref() {
            Some(scan) if self.board.snapshot().is_scanning => {
                scan.cancel.store(true, Ordering::SeqCst);
                log::info!("Scan cancellation requested");
                Ok(())
            }
            _ => Err(Error::NoScanRunning),
        }
    }

    /// Block until the current scan (if any) finishes
    pub fn wait(&self) -> ScanStatus {
        let handle = self.active().as_mut().and_then(|scan| scan.handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Scan worker panicked");
            }
        }
        self.board.snapshot()
    }

    /// Receive scan events from now on
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        self.board.subscribe()
    }
}
