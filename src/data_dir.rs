use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "DOCVEC_DATA_DIR";

/// Where docvec keeps its settings database, index store and lock file.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Pick `--data-dir`, then `$DOCVEC_DATA_DIR`, then
    /// `$XDG_DATA_HOME/docvec`, and create it if needed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docvec")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The settings database behind `docvec config`.
    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Index store directory; created by the first indexing run.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Held exclusively for the duration of an indexing run.
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("index.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
        assert_eq!(dir.store_dir(), tmp.path().join("store"));
        assert_eq!(dir.lock_file(), tmp.path().join("index.lock"));
    }

    #[test]
    fn resolve_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(nested.is_dir());
        assert!(!dir.store_dir().exists());
    }
}
