//! flock(2)-based locks for the run lock and the audit log.

use crate::error::{ProvisionError, Result};
use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

/// Held until dropped; closing the file releases the flock.
pub struct FileLock {
    _file: File,
}

fn open(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok(file)
}

impl FileLock {
    /// Block until the lock is ours.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open(path)?;
        file.lock_exclusive()
            .with_context(|| format!("acquire lock {}", path.display()))?;
        Ok(Self { _file: file })
    }

    /// Take the lock or fail with `Busy` if another process holds it.
    pub fn try_exclusive(path: &Path) -> Result<Self> {
        let file = open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.raw_os_error() == Some(11) => {
                Err(ProvisionError::Busy(path.to_path_buf()))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("try lock {}", path.display()))
                .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_run_is_busy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        let _held = FileLock::try_exclusive(&path).unwrap();
        match FileLock::try_exclusive(&path) {
            Err(ProvisionError::Busy(p)) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("lock acquired twice"),
        }
    }

    #[test]
    fn test_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        drop(FileLock::exclusive(&path).unwrap());
        assert!(FileLock::try_exclusive(&path).is_ok());
    }
}
