use chrono::{DateTime, Utc};
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::MediaFilter;

/// Point-in-time view of the current (or last) scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub root_path: Option<PathBuf>,
    pub media_filter: MediaFilter,
    /// Threshold requested with the scan, used as the default for queries
    pub threshold: Option<u32>,
    pub total_files: usize,
    /// Files finished in any way: cached, fingerprinted, skipped or failed
    pub processed_files: usize,
    pub current_file: Option<String>,
    pub cache_hits: usize,
    pub fingerprinted: usize,
    pub skipped_files: usize,
    pub pruned_files: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ScanStatus {
    /// Fraction of enumerated files processed, 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.total_files == 0 {
            if self.is_scanning {
                0.0
            } else {
                1.0
            }
        } else {
            self.processed_files as f64 / self.total_files as f64
        }
    }
}

/// Notifications pushed to subscribers while a scan runs
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started { root: PathBuf },
    Discovered { total: usize },
    Progress {
        processed: usize,
        total: usize,
        current: String,
    },
    FileFailed { message: String },
    Finished(ScanStatus),
}

/// How a single file ended up
#[derive(Debug)]
pub(crate) enum FileOutcome {
    CacheHit,
    Fingerprinted,
    Skipped(String),
    Failed(String),
}

/// Shared status record plus event subscribers.
///
/// Readers take cloned snapshots; only the scan worker writes while a scan
/// is running.
#[derive(Clone, Default)]
pub(crate) struct ScanBoard {
    status: Arc<Mutex<ScanStatus>>,
    subscribers: Arc<Mutex<Vec<Sender<ScanEvent>>>>,
}

impl ScanBoard {
    fn status(&self) -> MutexGuard<'_, ScanStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn snapshot(&self) -> ScanStatus {
        self.status().clone()
    }

    pub(crate) fn reset(&self, status: ScanStatus) {
        *self.status() = status;
    }

    pub(crate) fn update<F: FnOnce(&mut ScanStatus)>(&self, f: F) {
        f(&mut self.status());
    }

    pub(crate) fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Send to every live subscriber, dropping ones that hung up
    pub(crate) fn publish(&self, event: ScanEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// The scan worker's write handle.
///
/// Dropping it without [`ScanProgress::finish`] (a panicking worker) still
/// closes the scan so the single-flight slot is released.
pub(crate) struct ScanProgress {
    board: ScanBoard,
    finished: bool,
}

impl ScanProgress {
    pub(crate) fn new(board: ScanBoard) -> Self {
        Self {
            board,
            finished: false,
        }
    }

    pub(crate) fn set_total(&mut self, total: usize) {
        self.board.update(|s| s.total_files = total);
        self.board.publish(ScanEvent::Discovered { total });
    }

    pub(crate) fn begin_file(&mut self, path: &Path) {
        let current = path.display().to_string();
        self.board.update(|s| s.current_file = Some(current));
    }

    pub(crate) fn complete_file(&mut self, outcome: FileOutcome) {
        if let FileOutcome::Skipped(reason) = &outcome {
            log::warn!("Skipped {}", reason);
        }

        let mut failure = None;
        let mut snapshot = (0, 0, String::new());

        self.board.update(|s| {
            match outcome {
                FileOutcome::CacheHit => s.cache_hits += 1,
                FileOutcome::Fingerprinted => s.fingerprinted += 1,
                FileOutcome::Skipped(_) => s.skipped_files += 1,
                FileOutcome::Failed(message) => {
                    s.errors.push(message.clone());
                    failure = Some(message);
                }
            }
            s.processed_files += 1;
            snapshot = (
                s.processed_files,
                s.total_files,
                s.current_file.clone().unwrap_or_default(),
            );
        });

        if let Some(message) = failure {
            self.board.publish(ScanEvent::FileFailed { message });
        }
        let (processed, total, current) = snapshot;
        self.board.publish(ScanEvent::Progress {
            processed,
            total,
            current,
        });
    }

    /// Errors not tied to one file: walk failures, cache failures
    pub(crate) fn record_error(&mut self, message: String) {
        self.board.update(|s| s.errors.push(message));
    }

    pub(crate) fn set_pruned(&mut self, pruned: usize) {
        self.board.update(|s| s.pruned_files = pruned);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.board.update(|s| {
            s.cancelled = true;
            let message = format!(
                "scan cancelled after {} of {} files",
                s.processed_files, s.total_files
            );
            s.errors.push(message);
        });
    }

    pub(crate) fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.finished = true;
        self.board.update(|s| {
            s.is_scanning = false;
            s.current_file = None;
            s.end_time = Some(Utc::now());
        });

        let status = self.board.snapshot();
        log::info!(
            "Scan of {} finished: {} processed, {} fingerprinted, {} cached, {} skipped, {} errors",
            status
                .root_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            status.processed_files,
            status.fingerprinted,
            status.cache_hits,
            status.skipped_files,
            status.errors.len()
        );
        self.board.publish(ScanEvent::Finished(status));
    }
}

impl Drop for ScanProgress {
    fn drop(&mut self) {
        if !self.finished {
            self.record_error("scan worker stopped unexpectedly".to_string());
            self.close();
        }
    }
}
