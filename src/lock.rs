//! Single-run guard backed by an OS advisory file lock.

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// How often a busy lock is re-checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LockError {
    /// Another process held the lock for the whole wait.
    #[error("lock {} is held by another run (waited {:?})", .path.display(), .waited)]
    Busy { path: PathBuf, waited: Duration },

    #[error("cannot lock {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock on a file, released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, polling until `wait` has elapsed.
    ///
    /// A zero `wait` tries exactly once.
    pub fn acquire(path: impl AsRef<Path>, wait: Duration) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(Self { file, path });
                }
                Err(TryLockError::WouldBlock) => {
                    let waited = started.elapsed();
                    if waited >= wait {
                        warn!(path = %path.display(), ?waited, "lock busy");
                        return Err(LockError::Busy { path, waited });
                    }
                    thread::sleep(POLL_INTERVAL.min(wait - waited));
                }
                Err(TryLockError::Error(source)) => return Err(io_err(source)),
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpwatch.lock");

        let held = RunLock::acquire(&path, Duration::ZERO).unwrap();
        assert_eq!(held.path(), path);

        let err = RunLock::acquire(&path, Duration::from_millis(300)).unwrap_err();
        match err {
            LockError::Busy { waited, .. } => assert!(waited >= Duration::from_millis(300)),
            other => panic!("expected busy, got {:?}", other),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpwatch.lock");

        drop(RunLock::acquire(&path, Duration::ZERO).unwrap());
        assert!(RunLock::acquire(&path, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_unopenable_path() {
        let err = RunLock::acquire("/nonexistent/dir/cpwatch.lock", Duration::ZERO).unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
    }
}
