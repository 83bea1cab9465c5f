use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{MediaFilter, MediaKind};

/// A media file found under a scan root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Everything a walk produced
#[derive(Debug, Default)]
pub struct Discovery {
    /// Supported files, sorted by path
    pub files: Vec<DiscoveredFile>,
    /// Entries the walk could not read
    pub errors: Vec<String>,
}

/// Check a scan root and return its canonical form.
///
/// Runs before a scan is accepted so callers get the error synchronously.
pub fn validate_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }

    let canonical = root.canonicalize()?;
    if !canonical.is_dir() {
        return Err(Error::NotADirectory(canonical));
    }

    fs::read_dir(&canonical).map_err(|e| Error::RootUnreadable {
        path: canonical.clone(),
        reason: e.to_string(),
    })?;

    Ok(canonical)
}

/// Walk `root` and collect supported media files that pass `filter`.
///
/// Symbolic links are not followed. Unreadable entries are reported in
/// [`Discovery::errors`] and the walk continues.
pub fn discover_media(root: &Path, config: &Config, filter: MediaFilter) -> Discovery {
    let max_depth = config.max_depth.unwrap_or(usize::MAX);
    let mut discovery = Discovery::default();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let location = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                log::warn!("Skipping unreadable entry {}: {}", location, e);
                discovery.errors.push(format!("{}: {}", location, e));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(kind) = config.media_kind(path) {
            if filter.includes(kind) {
                discovery.files.push(DiscoveredFile {
                    path: path.to_path_buf(),
                    kind,
                });
            }
        }
    }

    discovery.files.sort_by(|a, b| a.path.cmp(&b.path));
    log::info!(
        "Discovered {} media files under {}",
        discovery.files.len(),
        root.display()
    );
    discovery
}

// -- Tests --
