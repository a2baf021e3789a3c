//! Per-cask file layout and locking.
//!
//! One cask owns three well-known paths inside its directory:
//!
//! ```text
//! <dir>/
//! ├─ <name>.cask          # the frame log
//! ├─ <name>.cask.compact  # compaction scratch file (transient)
//! └─ <name>.lock          # advisory lock for single-writer access
//! ```
//!
//! The lock file enforces the single-writer-per-cask discipline across
//! handles and processes.

use crate::error::{CaskError, CaskResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Extension of the frame log file.
const LOG_EXT: &str = "cask";
/// Extension of the compaction scratch file.
const COMPACT_EXT: &str = "cask.compact";
/// Extension of the lock file.
const LOCK_EXT: &str = "lock";

/// Paths and the advisory lock for one cask.
///
/// Holding a `CaskDir` means holding the exclusive lock; dropping it
/// releases the lock.
#[derive(Debug)]
pub struct CaskDir {
    dir: PathBuf,
    name: String,
    _lock_file: File,
}

impl CaskDir {
    /// Opens a cask directory and acquires the exclusive lock.
    ///
    /// # Errors
    ///
    /// - [`CaskError::LockHeld`] if another handle holds the lock
    /// - [`CaskError::Io`] if the directory cannot be created or the lock
    ///   file cannot be opened
    pub fn open(dir: &Path, name: &str, create_if_missing: bool) -> CaskResult<Self> {
        if !dir.exists() {
            if create_if_missing {
                fs::create_dir_all(dir)?;
            } else {
                return Err(CaskError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cask directory does not exist: {}", dir.display()),
                )));
            }
        }

        let lock_path = dir.join(format!("{name}.{LOCK_EXT}"));
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CaskError::LockHeld);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            _lock_file: lock_file,
        })
    }

    /// The cask name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the frame log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{LOG_EXT}", self.name))
    }

    /// Path of the compaction scratch file.
    #[must_use]
    pub fn compact_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{COMPACT_EXT}", self.name))
    }

    /// Path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{LOCK_EXT}", self.name))
    }

    /// Removes a leftover compaction scratch file, if any.
    ///
    /// A scratch file present at open means a previous compaction was
    /// interrupted before its rename; the live log is authoritative.
    pub fn remove_stale_compact_file(&self) -> CaskResult<()> {
        let path = self.compact_path();
        if path.exists() {
            tracing::warn!(path = %path.display(), "removing interrupted compaction file");
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Removes every file belonging to this cask.
    ///
    /// Consumes the handle; the lock is released afterwards.
    pub fn delete_files(self) -> CaskResult<()> {
        for path in [self.log_path(), self.compact_path(), self.lock_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.sync_dir()?;
        Ok(())
    }

    /// Atomically renames the compaction scratch file over the log file
    /// and syncs the directory so the swap is durable.
    pub fn swap_compact_file(&self) -> CaskResult<()> {
        fs::rename(self.compact_path(), self.log_path())?;
        self.sync_dir()?;
        Ok(())
    }

    /// Fsyncs the directory so renames and deletions are durable.
    #[cfg(unix)]
    fn sync_dir(&self) -> CaskResult<()> {
        let dir = File::open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    /// Windows NTFS journals metadata; directory fsync is not available.
    #[cfg(not(unix))]
    fn sync_dir(&self) -> CaskResult<()> {
        Ok(())
    }
}
