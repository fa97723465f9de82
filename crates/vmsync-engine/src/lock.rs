//! Advisory run lock
//!
//! An exclusive `flock` on a lock file keeps two runs from reconciling at
//! the same time. The lock goes away with the process, so a killed run never
//! leaves a stale lock behind.

use crate::error::{SyncError, SyncResult};
use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Held for the lifetime of a run; released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting.
    pub fn acquire(path: &Path) -> SyncResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SyncError::Lock(format!("{}: {}", path.display(), e)))?;

        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Run lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e == Errno::EWOULDBLOCK => Err(SyncError::AlreadyRunning(path.to_path_buf())),
            Err(e) => Err(SyncError::Lock(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmsync.lock");

        let held = RunLock::acquire(&path).unwrap();
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning(_)));

        drop(held);
        RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_unwritable_location() {
        let err = RunLock::acquire(Path::new("/nonexistent-dir/vmsync.lock")).unwrap_err();
        assert!(matches!(err, SyncError::Lock(_)));
    }
}
