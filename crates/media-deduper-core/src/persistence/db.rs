use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::processing::Fingerprint;
use crate::types::{CacheStats, FileRecord, MediaKind};

const SCHEMA_VERSION: i64 = 2;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY,
        path TEXT NOT NULL UNIQUE,
        filename TEXT NOT NULL,
        file_type TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        width INTEGER,
        height INTEGER,
        created_at INTEGER NOT NULL,
        modified_secs INTEGER NOT NULL,
        modified_nanos INTEGER NOT NULL,
        fingerprint BLOB NOT NULL,
        fingerprint_bits INTEGER NOT NULL,
        scan_date INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_files_fingerprint ON files(fingerprint);
    CREATE INDEX IF NOT EXISTS idx_files_file_type ON files(file_type);

    CREATE TABLE IF NOT EXISTS cache_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );";

const RECORD_COLUMNS: &str = "path, filename, file_type, size_bytes, width, height, \
     created_at, modified_secs, modified_nanos, fingerprint, fingerprint_bits, scan_date";

/// Persistent path → fingerprint cache backed by SQLite.
///
/// All access goes through one connection behind a mutex, so the scan worker
/// and query callers never interleave statements.
pub struct FingerprintCache {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl FingerprintCache {
    /// Open (or create) the cache file for the fingerprint parameters in `config`
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let cache = Self::initialize(conn, config, Some(path.to_path_buf()))?;

        info!("Fingerprint cache opened at {}", path.display());
        Ok(cache)
    }

    /// Throwaway cache, mainly for tests
    pub fn open_in_memory(config: &Config) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, config, None)
    }

    fn initialize(conn: Connection, config: &Config, location: Option<PathBuf>) -> Result<Self> {
        // A file that is not a database fails on its first statement
        let integrity: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| Error::CacheCorrupt(e.to_string()))?;
        if integrity != "ok" {
            return Err(Error::CacheCorrupt(integrity));
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 10000;",
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(Error::CacheCorrupt(format!(
                "schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        if version > 0 && version < SCHEMA_VERSION {
            // Rows are rebuilt by the next scan
            warn!(
                "Cache schema version {} is outdated; discarding cached records",
                version
            );
            conn.execute_batch("DROP TABLE IF EXISTS files;")?;
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        check_generation(&conn, config)?;

        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    /// Where the cache lives on disk, if anywhere
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent, so keep going
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up the record for an exact path
    pub fn get(&self, path: &Path) -> Result<Option<FileRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM files WHERE path = ?1",
            RECORD_COLUMNS
        ))?;

        let record = stmt
            .query_row(params![path_key(path)], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Insert or replace the record for `record.path`
    pub fn put(&self, record: &FileRecord) -> Result<()> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO files (path, filename, file_type, size_bytes, width, height,
                created_at, modified_secs, modified_nanos, fingerprint, fingerprint_bits,
                scan_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                file_type = excluded.file_type,
                size_bytes = excluded.size_bytes,
                width = excluded.width,
                height = excluded.height,
                created_at = excluded.created_at,
                modified_secs = excluded.modified_secs,
                modified_nanos = excluded.modified_nanos,
                fingerprint = excluded.fingerprint,
                fingerprint_bits = excluded.fingerprint_bits,
                scan_date = excluded.scan_date",
        )?;

        stmt.execute(params![
            path_key(&record.path),
            record.filename,
            record.kind.as_str(),
            record.size_bytes as i64,
            record.width,
            record.height,
            to_nanos(&record.created_at),
            record.modified_at.timestamp(),
            record.modified_at.timestamp_subsec_nanos(),
            record.fingerprint.to_bytes(),
            record.fingerprint.bit_len(),
            to_nanos(&record.scan_date),
        ])?;
        Ok(())
    }

    /// Remove the record for `path`; true if a row existed
    pub fn delete(&self, path: &Path) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM files WHERE path = ?1", params![path_key(path)])?;
        Ok(removed > 0)
    }

    /// All records at or below `root`, ordered by path.
    ///
    /// `root` must already be resolved; matching is by whole path components,
    /// so `/photos` never matches `/photos-old/a.jpg`.
    pub fn list_under(&self, root: &Path) -> Result<Vec<FileRecord>> {
        let root_key = path_key(root);
        let prefix = if root_key.ends_with(MAIN_SEPARATOR) {
            root_key.clone()
        } else {
            format!("{}{}", root_key, MAIN_SEPARATOR)
        };

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM files
             WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2
             ORDER BY path",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![root_key, prefix], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Aggregate counts over the whole cache
    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn();
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN file_type = 'image' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN file_type = 'video' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(size_bytes), 0),
                    MIN(scan_date)
             FROM files",
            [],
            |row| {
                Ok(CacheStats {
                    total_files_cached: row.get::<_, i64>(0)? as u64,
                    total_images: row.get::<_, i64>(1)? as u64,
                    total_videos: row.get::<_, i64>(2)? as u64,
                    total_size_bytes: row.get::<_, i64>(3)? as u64,
                    cache_created_at: row.get::<_, Option<i64>>(4)?.map(from_nanos),
                })
            },
        )?;
        Ok(stats)
    }

    /// Delete every record; returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn().execute("DELETE FROM files", [])?;
        info!("Cleared {} records from the fingerprint cache", removed);
        Ok(removed)
    }
}

/// Drop rows whose fingerprints were computed under different parameters.
///
/// Grid size and DCT factor shape every fingerprint; the frame position only
/// affects videos.
fn check_generation(conn: &Connection, config: &Config) -> Result<()> {
    let stored = |key: &str| -> Result<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    };
    let changed = |key: &str, current: &str| -> Result<Option<String>> {
        Ok(stored(key)?.filter(|value| value != current))
    };

    let grid = config.grid_size.to_string();
    let factor = config.dct_factor.to_string();
    let position = config.video_frame_position.to_string();

    let old_grid = changed("grid_size", &grid)?;
    let old_factor = changed("dct_factor", &factor)?;
    let old_position = changed("video_frame_position", &position)?;

    if old_grid.is_some() || old_factor.is_some() {
        let removed = conn.execute("DELETE FROM files", [])?;
        warn!(
            "Fingerprint parameters changed (grid {:?} -> {}, factor {:?} -> {}); discarded {} cached records",
            old_grid, grid, old_factor, factor, removed
        );
    } else if let Some(old) = &old_position {
        let removed = conn.execute(
            "DELETE FROM files WHERE file_type = ?1",
            params![MediaKind::Video.as_str()],
        )?;
        warn!(
            "Video frame position changed ({} -> {}); discarded {} cached videos",
            old, position, removed
        );
    }

    for (key, value) in [
        ("grid_size", &grid),
        ("dct_factor", &factor),
        ("video_frame_position", &position),
    ] {
        conn.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }
    debug!(
        "Cache generation: grid_size={} dct_factor={} video_frame_position={}",
        grid, factor, position
    );
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let kind_text: String = row.get(2)?;
    let kind = kind_text.parse::<MediaKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    let modified_secs: i64 = row.get(7)?;
    let modified_nanos: u32 = row.get(8)?;
    let modified_at = Utc
        .timestamp_opt(modified_secs, modified_nanos)
        .single()
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Integer,
                format!("modification time {}.{} out of range", modified_secs, modified_nanos)
                    .into(),
            )
        })?;

    let bytes: Vec<u8> = row.get(9)?;
    let bits: u32 = row.get(10)?;
    let fingerprint = Fingerprint::from_bytes(&bytes, bits).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Blob, Box::new(e))
    })?;

    Ok(FileRecord {
        path: PathBuf::from(row.get::<_, String>(0)?),
        filename: row.get(1)?,
        kind,
        size_bytes: row.get::<_, i64>(3)? as u64,
        width: row.get(4)?,
        height: row.get(5)?,
        created_at: from_nanos(row.get(6)?),
        modified_at,
        fingerprint,
        scan_date: from_nanos(row.get(11)?),
    })
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Nanoseconds since the epoch; saturates outside 1677..2262, which only
/// affects informational columns
fn to_nanos(time: &DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
