use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::persistence::FingerprintCache;

/// Performs the actual filesystem removal
pub trait FileRemover: Send + Sync {
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Removes files with `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Resolve `path` to an absolute path without `.`/`..` or symlinks.
///
/// The longest existing ancestor is canonicalized (following symlinks); the
/// rest is applied lexically, so paths that do not exist yet still resolve.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    for ancestor in absolute.ancestors() {
        let Ok(base) = ancestor.canonicalize() else {
            continue;
        };
        let Ok(tail) = absolute.strip_prefix(ancestor) else {
            continue;
        };

        let mut resolved = base;
        for component in tail.components() {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => resolved.push(part),
                _ => {}
            }
        }
        return Ok(resolved);
    }

    Err(Error::FileNotFound(absolute))
}

/// Check that `candidate` resolves to `root` or somewhere below it.
///
/// Containment is by whole path components: `/photos-old/a.jpg` is not
/// under `/photos`. Returns the resolved candidate.
pub fn validate_within(candidate: &Path, root: &Path) -> Result<PathBuf> {
    let resolved_root = resolve_path(root)?;
    let resolved = resolve_path(candidate)?;

    if resolved.starts_with(&resolved_root) {
        Ok(resolved)
    } else {
        Err(Error::OutsideScanRoot {
            path: resolved,
            root: resolved_root,
        })
    }
}

/// Guards destructive operations on scanned files
pub struct SafetyManager {
    cache: Arc<FingerprintCache>,
    remover: Arc<dyn FileRemover>,
}

impl SafetyManager {
    /// Create a SafetyManager that deletes through the filesystem
    pub fn new(cache: Arc<FingerprintCache>) -> Self {
        Self {
            cache,
            remover: Arc::new(FsRemover),
        }
    }

    /// Use a different removal backend
    pub fn with_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// Delete a file inside `scan_root` and forget its cache record.
    ///
    /// Nothing is touched unless the path passes containment. The cache row
    /// is removed only after the file itself is gone.
    pub fn delete_file(&self, candidate: &Path, scan_root: &Path) -> Result<PathBuf> {
        let resolved = validate_within(candidate, scan_root).map_err(|e| {
            log::warn!("Refusing to delete {}: {}", candidate.display(), e);
            e
        })?;

        if !resolved.is_file() {
            return Err(Error::FileNotFound(resolved));
        }

        if let Err(e) = self.remover.remove_file(&resolved) {
            log_file_error(&resolved, "delete", &e);
            return Err(Error::Io(e));
        }

        let had_record = self.cache.delete(&resolved)?;
        log_fs_modification(
            "delete",
            &resolved,
            Some(if had_record {
                "cache record removed"
            } else {
                "no cache record"
            }),
        );

        Ok(resolved)
    }
}
