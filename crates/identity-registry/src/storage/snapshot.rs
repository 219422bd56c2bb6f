//! Snapshot persistence — the whole registry table in one JSON file.
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "records": [ { ... IdentityRecord ... }, ... ]
//! }
//! ```
//!
//! Records are written sorted by owner so that snapshots of equal tables
//! are byte-identical.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StorageError;
use crate::principal::Principal;
use crate::record::IdentityRecord;
use crate::registry::IdentityRegistry;

// ── File format constants ─────────────────────────────────────────────────────

const SNAPSHOT_FILE_VERSION: u32 = 1;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ── On-disk structures ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    /// Format version number.
    version: u32,
    /// Every record in the registry.
    records: Vec<IdentityRecord>,
}

/// Read before the body so that unknown versions are reported as such
/// rather than as a shape mismatch.
#[derive(Debug, Deserialize)]
struct SnapshotHeader {
    version: u32,
}

// ── SnapshotStore ─────────────────────────────────────────────────────────────

/// Filesystem-backed snapshot of an [`IdentityRegistry`].
///
/// Writes go to a fresh sibling temporary file that is synced and renamed
/// over the target, so readers never see a half-written snapshot.
///
/// Processes sharing one snapshot must hold [`SnapshotStore::lock`] from
/// `load` through `save`; otherwise the last writer wins.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

/// Exclusive advisory lock on a snapshot's `.lock` sibling.
///
/// Released when dropped.
#[derive(Debug)]
pub struct SnapshotLock {
    _file: File,
    path: PathBuf,
}

impl SnapshotLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore {
    /// How long [`SnapshotStore::lock`] waits by default.
    pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Path of the lock file guarding this snapshot.
    pub fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    /// Take the exclusive lock if no other holder has it.
    ///
    /// Returns `Ok(None)` when the lock is held elsewhere. Missing parent
    /// directories are created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the lock file cannot be opened or
    /// locked.
    pub fn try_lock(&self) -> Result<Option<SnapshotLock>, StorageError> {
        std::fs::create_dir_all(self.parent_dir())?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(SnapshotLock {
                _file: file,
                path: lock_path,
            })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Take the exclusive lock, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Locked` if another holder keeps the lock past
    /// `timeout`, or `StorageError::Io` for filesystem errors.
    pub fn lock(&self, timeout: Duration) -> Result<SnapshotLock, StorageError> {
        let start = Instant::now();
        loop {
            if let Some(guard) = self.try_lock()? {
                log::trace!("locked {}", guard.path().display());
                return Ok(guard);
            }
            if start.elapsed() >= timeout {
                return Err(StorageError::Locked(self.lock_path().display().to_string()));
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }

    /// Persist every record of `registry`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails, or
    /// `StorageError::Io` for filesystem errors.
    pub fn save(&self, registry: &IdentityRegistry) -> Result<(), StorageError> {
        let file = SnapshotFile {
            version: SNAPSHOT_FILE_VERSION,
            records: registry.records(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let parent = self.parent_dir();
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;

        log::debug!(
            "saved {} identities to {}",
            file.records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Rebuild a registry from the snapshot.
    ///
    /// A missing file yields an empty registry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidFileFormat` for malformed or
    /// unsupported files, invalid owners, or two records sharing an owner.
    /// Returns `StorageError::Io` for filesystem errors.
    pub fn load(&self, clock: Arc<dyn Clock>) -> Result<IdentityRegistry, StorageError> {
        if !self.path.exists() {
            log::debug!("no snapshot at {}, starting empty", self.path.display());
            return Ok(IdentityRegistry::with_clock(clock));
        }

        let bytes = std::fs::read(&self.path)?;

        let header: SnapshotHeader = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::InvalidFileFormat(format!(
                "failed to parse snapshot {}: {e}",
                self.path.display()
            ))
        })?;
        if header.version != SNAPSHOT_FILE_VERSION {
            return Err(StorageError::InvalidFileFormat(format!(
                "unsupported snapshot version {} in {}",
                header.version,
                self.path.display()
            )));
        }

        let file: SnapshotFile = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::InvalidFileFormat(format!(
                "failed to parse snapshot {}: {e}",
                self.path.display()
            ))
        })?;

        for record in &file.records {
            Principal::parse(record.owner.as_str()).map_err(|e| {
                StorageError::InvalidFileFormat(format!(
                    "bad owner in snapshot {}: {e}",
                    self.path.display()
                ))
            })?;
        }

        let registry = IdentityRegistry::from_records(file.records, clock).map_err(|e| {
            StorageError::InvalidFileFormat(format!(
                "duplicate owner in snapshot {}: {e}",
                self.path.display()
            ))
        })?;
        log::debug!(
            "loaded {} identities from {}",
            registry.len(),
            self.path.display()
        );
        Ok(registry)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
