//! Exclusive lock over a state directory

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use strap_errors::{Error, StateError};

/// Held for the lifetime of an engine; released on drop
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Take the lock without waiting
    ///
    /// # Errors
    ///
    /// Returns `StateError::Locked` when another engine holds it, or an I/O
    /// error if the lock file cannot be created.
    pub fn acquire(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io_with_path(&e, path))?;

        if file.try_lock_exclusive().is_err() {
            return Err(StateError::Locked {
                path: path.display().to_string(),
            }
            .into());
        }

        tracing::debug!(path = %path.display(), "acquired state lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_fast_until_release() {
        let td = tempfile::tempdir().unwrap();
        let lock_path = td.path().join("nested").join("strap.lock");

        let first = StateLock::acquire(&lock_path).expect("first lock");
        let err = StateLock::acquire(&lock_path).unwrap_err();
        assert!(matches!(err, Error::State(StateError::Locked { .. })));

        drop(first);
        let again = StateLock::acquire(&lock_path).expect("lock after release");
        assert_eq!(again.path(), lock_path);
    }
}
