//! The persisted index store: vector index, chunk metadata and the set of
//! fully indexed files, saved and restored as one unit.
//!
//! On disk a store is two files in one directory:
//! - `vectors.bin`: the [`FlatL2Index`] blob
//! - `metadata.redb`: chunk records, indexed files and store info
//!
//! Both are loaded into memory and the database is closed again, so the
//! files are only touched at startup and at checkpoints.
//!
//! Every checkpoint bumps a generation number. The new blob is written to
//! `vectors.bin.tmp` first, the metadata commit records its generation, and
//! only then is the blob renamed over `vectors.bin`. The redb commit is the
//! point at which a checkpoint takes effect: a failure before it leaves the
//! previous checkpoint intact, and a failure after it leaves a blob under
//! the temporary name that loading picks up.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    vector_index::{FlatL2Index, Neighbor},
};

const VECTORS_FILE: &str = "vectors.bin";
const PENDING_VECTORS_FILE: &str = "vectors.bin.tmp";
const METADATA_FILE: &str = "metadata.redb";

/// Chunk ordinal -> JSON-encoded [`ChunkRecord`].
const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");
/// Absolute file path -> number of chunks it produced.
const INDEXED_FILES: TableDefinition<&str, u64> =
    TableDefinition::new("indexed_files");
const STORE_INFO: TableDefinition<&str, u64> =
    TableDefinition::new("store_info");

const INFO_DIMENSION: &str = "dimension";
const INFO_VECTOR_COUNT: &str = "vector_count";
const INFO_GENERATION: &str = "generation";

/// One chunk of a source document, stored at the same ordinal as its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub content: String,
    /// Absolute path of the originating file.
    pub source: String,
    /// Zero-based position of the chunk within its file.
    pub position: u32,
}

pub struct IndexStore {
    dir: PathBuf,
    index: FlatL2Index,
    chunks: Vec<ChunkRecord>,
    /// File -> chunk count.
    indexed_files: BTreeMap<String, u64>,
    /// Generation of the last committed checkpoint; 0 before the first.
    generation: u64,
}

impl IndexStore {
    /// An empty, unsaved store for `dir`.
    pub fn create(dir: &Path, dimension: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            index: FlatL2Index::new(dimension),
            chunks: Vec::new(),
            indexed_files: BTreeMap::new(),
            generation: 0,
        }
    }

    /// Load the store in `dir`, or start a fresh one.
    ///
    /// A store that is partially missing, fails to deserialize, or was built
    /// with a different dimension is discarded with a warning and replaced by
    /// an empty one; it is never repaired. I/O errors are returned as is.
    pub fn open(dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|_| Error::DataDir(dir.to_path_buf()))?;

        match Self::load_with_source(dir) {
            Ok(Some((store, source))) if store.dimension() == dimension => {
                if source != dir.join(VECTORS_FILE) {
                    tracing::info!(
                        generation = store.generation,
                        "finishing interrupted checkpoint"
                    );
                    std::fs::rename(&source, dir.join(VECTORS_FILE))?;
                }
                tracing::info!(
                    chunks = store.len(),
                    files = store.file_count(),
                    "loaded index store"
                );
                return Ok(store);
            }
            Ok(Some((store, _))) => {
                tracing::warn!(
                    stored = store.dimension(),
                    expected = dimension,
                    "index store was built with another embedding dimension; rebuilding"
                );
            }
            Ok(None) => {
                tracing::info!(dir = %dir.display(), "creating new index store");
                return Ok(Self::create(dir, dimension));
            }
            Err(e @ Error::StoreCorrupt(_)) => {
                tracing::warn!("discarding index store: {e}");
            }
            Err(e) => return Err(e),
        }

        Self::discard(dir)?;
        Ok(Self::create(dir, dimension))
    }

    /// Strictly load the store in `dir`.
    ///
    /// Returns `Ok(None)` when no checkpoint was ever committed and
    /// [`Error::StoreCorrupt`] when the store is incomplete or inconsistent.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        Ok(Self::load_with_source(dir)?.map(|(store, _)| store))
    }

    /// Like [`IndexStore::load`], also returning the blob the vectors came
    /// from.
    fn load_with_source(dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            if dir.join(VECTORS_FILE).exists() {
                return Err(Error::StoreCorrupt(format!(
                    "{METADATA_FILE} is missing"
                )));
            }
            // A lone pending blob is a first checkpoint that never committed.
            return Ok(None);
        }

        let (chunks, indexed_files, info) = read_metadata(&metadata_path)
            .map_err(|e| match e {
                // Another process has the database open; not corruption.
                Error::RedbDatabase(redb::DatabaseError::DatabaseAlreadyOpen)
                | Error::StoreCorrupt(_) => e,
                other => Error::StoreCorrupt(other.to_string()),
            })?;
        let generation = info.get(INFO_GENERATION).copied().unwrap_or(0);
        let (index, source) = read_vectors(dir, generation)?;

        let stored_dimension = info.get(INFO_DIMENSION).copied();
        if stored_dimension != Some(index.dimension() as u64) {
            return Err(Error::StoreCorrupt(format!(
                "metadata dimension {stored_dimension:?} does not match vector index dimension {}",
                index.dimension()
            )));
        }
        let stored_count = info.get(INFO_VECTOR_COUNT).copied();
        if stored_count != Some(index.len() as u64)
            || chunks.len() != index.len()
        {
            return Err(Error::StoreCorrupt(format!(
                "{} chunks and {} vectors (metadata expects {stored_count:?})",
                chunks.len(),
                index.len()
            )));
        }

        let store = Self {
            dir: dir.to_path_buf(),
            index,
            chunks,
            indexed_files,
            generation,
        };
        Ok(Some((store, source)))
    }

    /// Remove every store file that is present.
    pub fn discard(dir: &Path) -> Result<()> {
        for name in [VECTORS_FILE, PENDING_VECTORS_FILE, METADATA_FILE] {
            match std::fs::remove_file(dir.join(name)) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(e.into());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Flush the whole store to disk as the next generation.
    ///
    /// On error the files still hold the previous checkpoint.
    pub fn checkpoint(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|_| Error::DataDir(self.dir.clone()))?;
        let next = self.generation + 1;
        let pending = self.dir.join(PENDING_VECTORS_FILE);
        self.index.save(&pending, next)?;

        let db = Database::create(self.dir.join(METADATA_FILE))?;
        let txn = db.begin_write()?;
        txn.delete_table(CHUNKS)?;
        txn.delete_table(INDEXED_FILES)?;
        {
            let mut chunks = txn.open_table(CHUNKS)?;
            for (ordinal, record) in self.chunks.iter().enumerate() {
                let bytes = serde_json::to_vec(record)?;
                chunks.insert(ordinal as u64, bytes.as_slice())?;
            }

            let mut files = txn.open_table(INDEXED_FILES)?;
            for (path, count) in &self.indexed_files {
                files.insert(path.as_str(), *count)?;
            }

            let mut info = txn.open_table(STORE_INFO)?;
            info.insert(INFO_DIMENSION, self.index.dimension() as u64)?;
            info.insert(INFO_VECTOR_COUNT, self.index.len() as u64)?;
            info.insert(INFO_GENERATION, next)?;
        }
        txn.commit()?;
        drop(db);
        self.generation = next;

        if let Err(e) = std::fs::rename(&pending, self.dir.join(VECTORS_FILE)) {
            // Committed already; the next open finishes the rename.
            tracing::warn!("could not move vector blob into place: {e}");
        }

        tracing::debug!(
            generation = next,
            chunks = self.len(),
            files = self.file_count(),
            "index store checkpointed"
        );
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Number of chunks (equal to the number of vectors).
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    pub fn file_count(&self) -> usize {
        self.indexed_files.len()
    }

    pub fn is_indexed(&self, file: &str) -> bool {
        self.indexed_files.contains_key(file)
    }

    pub fn indexed_files(&self) -> impl Iterator<Item = &str> {
        self.indexed_files.keys().map(String::as_str)
    }

    pub fn chunk(&self, ordinal: usize) -> Option<&ChunkRecord> {
        self.chunks.get(ordinal)
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    /// Insert all chunks of `source` with their vectors and mark the file as
    /// indexed.
    ///
    /// Either everything is inserted or nothing changes. Chunks from an
    /// earlier indexing of the same file are replaced.
    pub fn insert_file(
        &mut self,
        source: &str,
        contents: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if contents.len() != vectors.len() {
            return Err(Error::Config(format!(
                "{} chunks but {} vectors for {source}",
                contents.len(),
                vectors.len()
            )));
        }
        if let Some(bad) =
            vectors.iter().find(|v| v.len() != self.index.dimension())
        {
            return Err(Error::DimensionMismatch {
                expected: self.index.dimension(),
                actual: bad.len(),
            });
        }

        if self.indexed_files.contains_key(source) {
            self.remove_chunks_of(source);
        }

        self.index.add(&vectors)?;
        let count = contents.len();
        self.chunks.extend(contents.into_iter().enumerate().map(
            |(position, content)| ChunkRecord {
                content,
                source: source.to_string(),
                position: position as u32,
            },
        ));
        self.indexed_files.insert(source.to_string(), count as u64);

        Ok(count)
    }

    fn remove_chunks_of(&mut self, source: &str) {
        let keep: Vec<bool> =
            self.chunks.iter().map(|c| c.source != source).collect();
        self.index.retain(|ordinal| keep[ordinal]);
        self.chunks.retain(|c| c.source != source);
        self.indexed_files.remove(source);
    }

    /// Nearest stored vectors to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.index.search(query, k)
    }
}

/// Load the blob tagged with `generation`, preferring `vectors.bin` over a
/// blob whose rename was interrupted.
fn read_vectors(dir: &Path, generation: u64) -> Result<(FlatL2Index, PathBuf)> {
    let mut reason = format!("{VECTORS_FILE} is missing");
    for name in [VECTORS_FILE, PENDING_VECTORS_FILE] {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        match FlatL2Index::load(&path) {
            Ok((index, found)) if found == generation => {
                return Ok((index, path));
            }
            Ok((_, found)) if name == VECTORS_FILE => {
                reason = format!(
                    "{VECTORS_FILE} is generation {found}, metadata expects {generation}"
                );
            }
            Ok(_) => {}
            Err(e @ Error::StoreCorrupt(_)) if name == VECTORS_FILE => {
                reason = e.to_string();
            }
            Err(e) if name == VECTORS_FILE => return Err(e),
            Err(_) => {}
        }
    }
    Err(Error::StoreCorrupt(reason))
}

type Metadata = (Vec<ChunkRecord>, BTreeMap<String, u64>, BTreeMap<String, u64>);

fn read_metadata(path: &Path) -> Result<Metadata> {
    let db = Database::open(path)?;
    let txn = db.begin_read()?;

    let mut chunks = Vec::new();
    let table = txn.open_table(CHUNKS)?;
    for entry in table.iter()? {
        let (k, v) = entry?;
        if k.value() != chunks.len() as u64 {
            return Err(Error::StoreCorrupt(format!(
                "chunk ordinals are not contiguous at {}",
                k.value()
            )));
        }
        chunks.push(serde_json::from_slice::<ChunkRecord>(v.value())?);
    }

    let mut indexed_files = BTreeMap::new();
    let table = txn.open_table(INDEXED_FILES)?;
    for entry in table.iter()? {
        let (k, v) = entry?;
        indexed_files.insert(k.value().to_string(), v.value());
    }

    let mut info = BTreeMap::new();
    let table = txn.open_table(STORE_INFO)?;
    for entry in table.iter()? {
        let (k, v) = entry?;
        info.insert(k.value().to_string(), v.value());
    }

    Ok((chunks, indexed_files, info))
}

/// Summary of what is on disk, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreStatus {
    Missing,
    Ready {
        dimension: usize,
        chunks: usize,
        files: usize,
    },
    Corrupt {
        reason: String,
    },
}

impl StoreStatus {
    /// Inspect the store in `dir` without modifying it.
    pub fn inspect(dir: &Path) -> Self {
        match IndexStore::load(dir) {
            Ok(None) => StoreStatus::Missing,
            Ok(Some(store)) => StoreStatus::Ready {
                dimension: store.dimension(),
                chunks: store.len(),
                files: store.file_count(),
            },
            Err(e) => StoreStatus::Corrupt {
                reason: e.to_string(),
            },
        }
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreStatus::Missing => f.write_str("not built yet"),
            StoreStatus::Ready {
                dimension,
                chunks,
                files,
            } => write!(
                f,
                "{chunks} chunks from {files} files (dimension {dimension})"
            ),
            StoreStatus::Corrupt { reason } => {
                write!(f, "unreadable, will be rebuilt on next index ({reason})")
            }
        }
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("dir", &self.dir)
            .field("dimension", &self.dimension())
            .field("chunks", &self.len())
            .field("files", &self.file_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    fn populated(dir: &Path) -> IndexStore {
        let mut store = IndexStore::open(dir, 4).unwrap();
        store
            .insert_file(
                "/docs/a.txt",
                vec!["alpha one".into(), "alpha two".into()],
                vec![unit(4, 0), unit(4, 1)],
            )
            .unwrap();
        store
            .insert_file("/docs/b.txt", vec!["beta".into()], vec![unit(4, 2)])
            .unwrap();
        store
    }

    #[test]
    fn open_creates_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&tmp.path().join("store"), 8).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), 8);
        assert!(store.search(&[0.0; 8], 3).unwrap().is_empty());
        assert!(IndexStore::load(store.dir()).unwrap().is_none());
    }

    #[test]
    fn insert_keeps_counts_in_step() {
        let tmp = tempfile::tempdir().unwrap();
        let store = populated(tmp.path());
        assert_eq!(store.len(), 3);
        assert_eq!(store.vector_count(), 3);
        assert_eq!(store.file_count(), 2);
        assert!(store.is_indexed("/docs/a.txt"));
        assert_eq!(store.chunk(1).unwrap().position, 1);
        assert_eq!(store.chunk(2).unwrap().source, "/docs/b.txt");
    }

    #[test]
    fn checkpoint_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        store.checkpoint().unwrap();

        let reloaded = IndexStore::load(tmp.path()).unwrap().unwrap();
        assert_eq!(reloaded.chunks(), store.chunks());
        assert_eq!(
            reloaded.indexed_files().collect::<Vec<_>>(),
            vec!["/docs/a.txt", "/docs/b.txt"]
        );
        assert_eq!(
            reloaded.search(&unit(4, 1), 3).unwrap(),
            store.search(&unit(4, 1), 3).unwrap()
        );
    }

    #[test]
    fn checkpoint_overwrites_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        store.checkpoint().unwrap();
        store
            .insert_file("/docs/a.txt", vec!["alpha".into()], vec![unit(4, 3)])
            .unwrap();
        store.checkpoint().unwrap();

        let reloaded = IndexStore::open(tmp.path(), 4).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.chunk(0).unwrap().content, "beta");
        assert_eq!(reloaded.chunk(1).unwrap().content, "alpha");
    }

    #[test]
    fn dimension_mismatch_leaves_store_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        let err = store
            .insert_file("/docs/c.txt", vec!["gamma".into()], vec![vec![1.0]])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 1
            }
        ));
        assert_eq!(store.len(), 3);
        assert!(!store.is_indexed("/docs/c.txt"));
    }

    #[test]
    fn file_without_chunks_is_still_indexed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = IndexStore::open(tmp.path(), 4).unwrap();
        assert_eq!(store.insert_file("/docs/empty.txt", vec![], vec![]).unwrap(), 0);
        assert!(store.is_indexed("/docs/empty.txt"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_vectors_are_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        populated(tmp.path()).checkpoint().unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), b"garbage").unwrap();

        assert!(matches!(
            IndexStore::load(tmp.path()),
            Err(Error::StoreCorrupt(_))
        ));
        let store = IndexStore::open(tmp.path(), 4).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.file_count(), 0);
        assert!(!tmp.path().join(VECTORS_FILE).exists());
    }

    #[test]
    fn corrupt_metadata_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        populated(tmp.path()).checkpoint().unwrap();
        std::fs::write(tmp.path().join(METADATA_FILE), b"not a database")
            .unwrap();

        let mut store = IndexStore::open(tmp.path(), 4).unwrap();
        assert!(store.is_empty());

        // The rebuilt store checkpoints cleanly over the discarded files.
        store
            .insert_file("/docs/a.txt", vec!["alpha".into()], vec![unit(4, 0)])
            .unwrap();
        store.checkpoint().unwrap();
        assert_eq!(IndexStore::load(tmp.path()).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn missing_half_of_store_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        populated(tmp.path()).checkpoint().unwrap();
        std::fs::remove_file(tmp.path().join(METADATA_FILE)).unwrap();

        assert!(matches!(
            IndexStore::load(tmp.path()),
            Err(Error::StoreCorrupt(_))
        ));
        assert!(IndexStore::open(tmp.path(), 4).unwrap().is_empty());
    }

    #[test]
    fn count_disagreement_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        store.checkpoint().unwrap();

        let mut shorter = FlatL2Index::new(4);
        shorter.add(&[unit(4, 0)]).unwrap();
        shorter.save(&tmp.path().join(VECTORS_FILE), 1).unwrap();

        assert!(matches!(
            IndexStore::load(tmp.path()),
            Err(Error::StoreCorrupt(_))
        ));
    }

    #[test]
    fn status_reflects_disk() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(StoreStatus::inspect(tmp.path()), StoreStatus::Missing);

        populated(tmp.path()).checkpoint().unwrap();
        assert_eq!(
            StoreStatus::inspect(tmp.path()),
            StoreStatus::Ready {
                dimension: 4,
                chunks: 3,
                files: 2
            }
        );

        std::fs::remove_file(tmp.path().join(VECTORS_FILE)).unwrap();
        assert!(matches!(
            StoreStatus::inspect(tmp.path()),
            StoreStatus::Corrupt { .. }
        ));
        // Inspection never deletes anything.
        assert!(tmp.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn failed_checkpoint_keeps_previous_one() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = IndexStore::open(tmp.path(), 4).unwrap();
        store
            .insert_file("/docs/a.txt", vec!["alpha".into()], vec![unit(4, 0)])
            .unwrap();
        store.checkpoint().unwrap();

        // A reader holding the database makes the next commit fail.
        let reader = Database::open(tmp.path().join(METADATA_FILE)).unwrap();
        store
            .insert_file("/docs/b.txt", vec!["beta".into()], vec![unit(4, 1)])
            .unwrap();
        assert!(store.checkpoint().is_err());
        drop(reader);

        let reopened = IndexStore::open(tmp.path(), 4).unwrap();
        assert_eq!(reopened.file_count(), 1);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.is_indexed("/docs/a.txt"));

        // The writer retries at the same generation and succeeds.
        store.checkpoint().unwrap();
        assert_eq!(IndexStore::load(tmp.path()).unwrap().unwrap().file_count(), 2);
    }

    #[test]
    fn forced_replace_with_same_count_stays_aligned_after_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = IndexStore::open(tmp.path(), 4).unwrap();
        store
            .insert_file("/docs/a.txt", vec!["old".into()], vec![unit(4, 0)])
            .unwrap();
        store.checkpoint().unwrap();

        let reader = Database::open(tmp.path().join(METADATA_FILE)).unwrap();
        store
            .insert_file("/docs/a.txt", vec!["new".into()], vec![unit(4, 3)])
            .unwrap();
        assert!(store.checkpoint().is_err());
        drop(reader);

        let reopened = IndexStore::load(tmp.path()).unwrap().unwrap();
        assert_eq!(reopened.chunk(0).unwrap().content, "old");
        let hits = reopened.search(&unit(4, 0), 1).unwrap();
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn interrupted_rename_is_finished_on_open() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        store.checkpoint().unwrap();
        let first_blob = std::fs::read(tmp.path().join(VECTORS_FILE)).unwrap();

        store
            .insert_file("/docs/c.txt", vec!["gamma".into()], vec![unit(4, 3)])
            .unwrap();
        store.checkpoint().unwrap();

        // Committed metadata, but the new blob never left its temporary name.
        std::fs::rename(
            tmp.path().join(VECTORS_FILE),
            tmp.path().join(PENDING_VECTORS_FILE),
        )
        .unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), first_blob).unwrap();

        assert_eq!(IndexStore::load(tmp.path()).unwrap().unwrap().len(), 4);
        let reopened = IndexStore::open(tmp.path(), 4).unwrap();
        assert_eq!(reopened.len(), 4);
        assert!(!tmp.path().join(PENDING_VECTORS_FILE).exists());
        assert_eq!(
            FlatL2Index::load(&tmp.path().join(VECTORS_FILE)).unwrap().1,
            2
        );
    }

    #[test]
    fn stale_blob_without_pending_one_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = populated(tmp.path());
        store.checkpoint().unwrap();
        let first_blob = std::fs::read(tmp.path().join(VECTORS_FILE)).unwrap();
        store.checkpoint().unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), first_blob).unwrap();

        assert!(matches!(
            IndexStore::load(tmp.path()),
            Err(Error::StoreCorrupt(_))
        ));
    }

    #[test]
    fn uncommitted_first_checkpoint_is_no_store() {
        let tmp = tempfile::tempdir().unwrap();
        FlatL2Index::new(4)
            .save(&tmp.path().join(PENDING_VECTORS_FILE), 1)
            .unwrap();
        assert!(IndexStore::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn other_dimension_is_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        populated(tmp.path()).checkpoint().unwrap();

        let store = IndexStore::open(tmp.path(), 16).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), 16);
    }
}
