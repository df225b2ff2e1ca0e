use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::{
    error::{Error, Result},
    extract::ExtractorRegistry,
};

/// A discovered document file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DiscoveredFile {
    /// Fully resolved absolute path; also the file's identifier in the store.
    pub absolute_path: PathBuf,
    /// Path relative to the source root it was found under.
    pub relative_path: PathBuf,
}

impl DiscoveredFile {
    /// The identifier recorded in the indexed-file set and chunk metadata.
    pub fn id(&self) -> String {
        self.absolute_path.to_string_lossy().into_owned()
    }
}

/// Compile exclude patterns, matched against root-relative paths.
pub fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid exclude pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid exclude patterns: {e}")))
}

/// Recursively walk every root and discover files the registry can extract.
///
/// Skips hidden files/directories (names starting with `.`) and anything
/// matching `excludes`. Results are sorted by absolute path and deduplicated,
/// so overlapping roots never yield the same file twice. Returns
/// [`Error::PathNotFound`] for a root that does not exist.
pub fn discover_files(
    roots: &[PathBuf],
    registry: &ExtractorRegistry,
    excludes: &GlobSet,
) -> Result<Vec<DiscoveredFile>> {
    let mut results = BTreeSet::new();
    for root in roots {
        if !root.is_dir() {
            return Err(Error::PathNotFound(root.clone()));
        }
        let canonical_root = root.canonicalize()?;
        walk_dir(
            &canonical_root,
            &canonical_root,
            registry,
            excludes,
            &mut results,
        )?;
    }

    // Keep the first occurrence per absolute path.
    let mut seen = BTreeSet::new();
    Ok(results
        .into_iter()
        .filter(|f| seen.insert(f.absolute_path.clone()))
        .collect())
}

fn walk_dir(
    root: &Path,
    current: &Path,
    registry: &ExtractorRegistry,
    excludes: &GlobSet,
    results: &mut BTreeSet<DiscoveredFile>,
) -> Result<()> {
    let entries = match std::fs::read_dir(current) {
        Ok(entries) => entries,
        Err(e) if current != root => {
            tracing::warn!(dir = %current.display(), "skipping unreadable directory: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %current.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if excludes.is_match(relative) {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping entry: {e}");
                continue;
            }
        };

        if file_type.is_dir() {
            walk_dir(root, &path, registry, excludes, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            // Directory symlinks are not followed (cycle prevention).
            if resolved.is_file() && registry.supports(&resolved) {
                results.insert(DiscoveredFile {
                    absolute_path: resolved,
                    relative_path: relative.to_path_buf(),
                });
            }
        } else if file_type.is_file()
            && registry.supports(&path)
            && let Some(absolute_path) = canonical_file(&path)
        {
            results.insert(DiscoveredFile {
                absolute_path,
                relative_path: relative.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Resolve a regular file found during the walk. Files can disappear while
/// a synced folder is being walked; those are skipped.
fn canonical_file(path: &Path) -> Option<PathBuf> {
    match path.canonicalize() {
        Ok(resolved) => Some(resolved),
        Err(e) => {
            tracing::warn!(path = %path.display(), "skipping file: {e}");
            None
        }
    }
}
