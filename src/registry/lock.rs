//! Advisory lock held by mutating commands.
//!
//! Concurrent invocations are not a supported configuration; the lock only
//! makes a second one fail fast instead of racing the read-modify-write of
//! the registry, config and proxy directories.

use crate::error::ParkError;
use crate::paths::Paths;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    pub fn acquire(paths: &Paths) -> Result<Self> {
        std::fs::create_dir_all(&paths.home).map_err(|e| ParkError::io(&paths.home, e))?;

        // Never unlink the lock file: removing a held lock lets a second
        // process lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&paths.lock)
            .with_context(|| format!("opening lock file '{}'", paths.lock.display()))?;

        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "another phppark command is running (lock held on {})",
                paths.lock.display()
            );
        }
        debug!(path = %paths.lock.display(), "acquired lock");

        Ok(Self {
            file,
            path: paths.lock.clone(),
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "released lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_fails_until_released() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::at(temp.path());

        let first = RegistryLock::acquire(&paths).unwrap();
        assert!(RegistryLock::acquire(&paths).is_err());

        drop(first);
        assert!(RegistryLock::acquire(&paths).is_ok());
    }
}
