//! On-disk snapshots of the response cache
//!
//! Provides a `CacheSnapshot` that writes the unexpired entries of a
//! `ResponseCache` to a JSON file and restores them later, keeping each
//! entry's original timestamp so TTLs keep counting across restarts.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{CacheEntry, ResponseCache};

/// File name used inside the snapshot directory
const SNAPSHOT_FILE: &str = "responses.json";

/// Errors that can occur while reading or writing a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem access failed
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file is not valid JSON for the expected layout
    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Layout of the snapshot file
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    /// When the snapshot was written
    saved_at: DateTime<Utc>,
    /// Entries that were valid at `saved_at`
    entries: Vec<CacheEntry>,
}

/// Reads and writes cache snapshots at a fixed path
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    path: PathBuf,
}

impl CacheSnapshot {
    /// Creates a snapshot handle in the XDG cache directory
    ///
    /// Uses `~/.cache/quotegate/responses.json` on Linux, or the equivalent
    /// location on other platforms. Returns `None` if no home directory can
    /// be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "quotegate")?;
        Some(Self::with_dir(project_dirs.cache_dir()))
    }

    /// Creates a snapshot handle inside a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SNAPSHOT_FILE),
        }
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the scratch file a write goes through before the rename
    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Writes every unexpired entry of `cache` to disk
    ///
    /// Creates the parent directory if needed. The snapshot is written to a
    /// sibling file and renamed into place, so an interrupted write never
    /// replaces the previous snapshot with a partial one. Returns the number
    /// of entries written.
    pub fn write(&self, cache: &ResponseCache) -> Result<usize, SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = SnapshotFile {
            saved_at: Utc::now(),
            entries: cache.valid_entries(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        debug!(
            "wrote {} cache entries to {}",
            file.entries.len(),
            self.path.display()
        );
        Ok(file.entries.len())
    }

    /// Restores entries from disk into `cache`
    ///
    /// A missing snapshot file is not an error and restores nothing. Entries
    /// that have expired since the snapshot was taken are skipped. Returns
    /// the number of entries restored.
    pub fn read_into(&self, cache: &ResponseCache) -> Result<usize, SnapshotError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let file: SnapshotFile = serde_json::from_str(&content)?;

        let restored = file
            .entries
            .into_iter()
            .map(|entry| cache.restore(entry))
            .filter(|restored| *restored)
            .count();

        debug!(
            "restored {} cache entries from {} (saved {})",
            restored,
            self.path.display(),
            file.saved_at
        );
        Ok(restored)
    }
}
