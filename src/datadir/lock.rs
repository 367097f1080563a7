//! Advisory directory locks.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Lock file guarding a running node's chain directory
pub const NODE_LOCK_FILE: &str = "node.lock";

/// An exclusive lock held on a lock file until dropped.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Take the lock at `path` without blocking.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                let dir = path.parent().unwrap_or(path);
                Err(LockError::InUse(dir.to_path_buf()))
            }
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Path of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // Released on close anyway; unlocking first keeps Windows happy when
        // the file is removed right after.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process holds the lock
    #[error("data directory {0} is already in use by another process")]
    InUse(PathBuf),
    /// The lock file could not be opened or locked
    #[error("failed to lock {path}: {source}")]
    Io {
        /// Lock file
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
}
