use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Exclusive advisory lock held for the duration of an indexing run.
///
/// Released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock at `path` without blocking.
    ///
    /// Fails with [`Error::Locked`] when another process holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "store lock acquired");
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(Error::Locked(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "failed to release store lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.lock");

        let held = StoreLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path);
        assert!(matches!(StoreLock::acquire(&path), Err(Error::Locked(p)) if p == path));

        drop(held);
        assert!(StoreLock::acquire(&path).is_ok());
    }
}
