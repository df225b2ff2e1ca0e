//! The indexing run: discover files, skip the ones already indexed, and
//! extract, chunk, embed and insert the rest in throttled batches with a
//! checkpoint after every batch.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use globset::GlobSet;

use crate::{
    chunking::{ChunkingConfig, chunk_segments},
    embedding::Embedder,
    error::{Error, Result},
    extract::ExtractorRegistry,
    store::IndexStore,
    walker::{DiscoveredFile, build_excludes, discover_files},
};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_FILE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_BATCH_COOLDOWN: Duration = Duration::from_millis(3000);

/// Knobs for one indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Files per batch; the store is checkpointed after each batch.
    pub batch_size: usize,
    /// Pause between two files of the same batch.
    pub file_delay: Duration,
    /// Pause after a checkpoint when more batches follow.
    pub batch_cooldown: Duration,
    pub chunking: ChunkingConfig,
    /// Re-index files that are already in the store.
    pub force: bool,
    /// Glob patterns matched against root-relative paths.
    pub exclude: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            file_delay: DEFAULT_FILE_DELAY,
            batch_cooldown: DEFAULT_BATCH_COOLDOWN,
            chunking: ChunkingConfig::default(),
            force: false,
            exclude: Vec::new(),
        }
    }
}

impl IndexSettings {
    /// Settings with every pause removed.
    pub fn unthrottled() -> Self {
        Self {
            file_delay: Duration::ZERO,
            batch_cooldown: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every batch was processed; individual files may still have failed.
    Completed,
    /// All discovered files were already indexed.
    NothingToDo,
    /// The run did not start.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmbedderUnavailable(String),
    /// None of the configured source roots exists.
    NoSourceRoots,
    DiscoveryFailed(String),
    /// The store holds vectors of another dimension than the embedder emits.
    DimensionMismatch { store: usize, embedder: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::EmbedderUnavailable(reason) => {
                write!(f, "embedding model unavailable: {reason}")
            }
            SkipReason::NoSourceRoots => {
                f.write_str("no configured source root exists")
            }
            SkipReason::DiscoveryFailed(reason) => {
                write!(f, "file discovery failed: {reason}")
            }
            SkipReason::DimensionMismatch { store, embedder } => write!(
                f,
                "store dimension {store} does not match embedder dimension {embedder}"
            ),
        }
    }
}

/// A file that could not be indexed. It stays eligible for the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// What an indexing run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub outcome: RunOutcome,
    /// Supported files found under the source roots.
    pub discovered: usize,
    /// Files selected for processing.
    pub pending: usize,
    pub files_indexed: usize,
    pub chunks_added: usize,
    pub failures: Vec<FileFailure>,
    pub checkpoints: usize,
    pub checkpoint_errors: usize,
}

impl IndexReport {
    fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            discovered: 0,
            pending: 0,
            files_indexed: 0,
            chunks_added: 0,
            failures: Vec::new(),
            checkpoints: 0,
            checkpoint_errors: 0,
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        tracing::warn!("indexing skipped: {reason}");
        Self::new(RunOutcome::Skipped(reason))
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, Copy)]
pub enum IndexEvent<'a> {
    /// Discovery finished; `pending` files will be processed.
    Started { pending: usize },
    FileIndexed { path: &'a Path, chunks: usize },
    FileFailed { path: &'a Path },
    Checkpointed { batch: usize, batches: usize },
    /// About to sleep for `duration` before continuing.
    Paused { pause: Pause, duration: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// Between two files of one batch.
    FileDelay,
    /// After a checkpoint, before the next batch.
    BatchCooldown,
}

/// Drives indexing runs against an [`IndexStore`].
pub struct Indexer<'a> {
    embedder: &'a dyn Embedder,
    extractors: &'a ExtractorRegistry,
    settings: IndexSettings,
    excludes: GlobSet,
}

impl<'a> Indexer<'a> {
    /// Validate `settings` and build an indexer.
    pub fn new(
        embedder: &'a dyn Embedder,
        extractors: &'a ExtractorRegistry,
        settings: IndexSettings,
    ) -> Result<Self> {
        if settings.batch_size == 0 {
            return Err(Error::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        settings.chunking.validate()?;
        let excludes = build_excludes(&settings.exclude)?;

        Ok(Self {
            embedder,
            extractors,
            settings,
            excludes,
        })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Open (or create) the store in `store_dir` for the active embedder and
    /// run against it.
    ///
    /// The store is left untouched when the embedder is unavailable, since
    /// its dimension is unknown.
    pub fn run_in(
        &self,
        roots: &[PathBuf],
        store_dir: &Path,
        on_event: &mut dyn FnMut(IndexEvent<'_>),
    ) -> Result<IndexReport> {
        if !self.embedder.is_available() {
            return Ok(IndexReport::skipped(self.unavailable_reason()));
        }
        let mut store = IndexStore::open(store_dir, self.embedder.dimension())?;
        Ok(self.run_with_progress(roots, &mut store, on_event))
    }

    /// Run without progress reporting.
    pub fn run(&self, roots: &[PathBuf], store: &mut IndexStore) -> IndexReport {
        self.run_with_progress(roots, store, &mut |_| {})
    }

    /// Run once over `roots`.
    ///
    /// Never fails: per-file problems are recorded in the report and leave
    /// the file eligible for a later run, and a run that cannot start is
    /// reported as [`RunOutcome::Skipped`].
    pub fn run_with_progress(
        &self,
        roots: &[PathBuf],
        store: &mut IndexStore,
        on_event: &mut dyn FnMut(IndexEvent<'_>),
    ) -> IndexReport {
        if !self.embedder.is_available() {
            return IndexReport::skipped(self.unavailable_reason());
        }
        if store.dimension() != self.embedder.dimension() {
            return IndexReport::skipped(SkipReason::DimensionMismatch {
                store: store.dimension(),
                embedder: self.embedder.dimension(),
            });
        }

        let existing: Vec<PathBuf> = roots
            .iter()
            .filter(|root| {
                let exists = root.is_dir();
                if !exists {
                    tracing::warn!(
                        root = %root.display(),
                        "{}",
                        Error::PathNotFound(root.to_path_buf())
                    );
                }
                exists
            })
            .cloned()
            .collect();
        if existing.is_empty() {
            return IndexReport::skipped(SkipReason::NoSourceRoots);
        }

        let discovered =
            match discover_files(&existing, self.extractors, &self.excludes) {
                Ok(files) => files,
                Err(e) => {
                    return IndexReport::skipped(SkipReason::DiscoveryFailed(
                        e.to_string(),
                    ));
                }
            };

        let pending: Vec<DiscoveredFile> = discovered
            .iter()
            .filter(|f| self.settings.force || !store.is_indexed(&f.id()))
            .cloned()
            .collect();

        let mut report = IndexReport::new(RunOutcome::Completed);
        report.discovered = discovered.len();
        report.pending = pending.len();

        if pending.is_empty() {
            tracing::info!(
                discovered = report.discovered,
                "index is up to date"
            );
            report.outcome = RunOutcome::NothingToDo;
            return report;
        }

        let batches = pending.len().div_ceil(self.settings.batch_size);
        tracing::info!(
            discovered = report.discovered,
            pending = report.pending,
            batches,
            "indexing started"
        );
        on_event(IndexEvent::Started {
            pending: report.pending,
        });

        for (batch_index, batch) in
            pending.chunks(self.settings.batch_size).enumerate()
        {
            for (i, file) in batch.iter().enumerate() {
                if i > 0 {
                    pause(Pause::FileDelay, self.settings.file_delay, on_event);
                }
                match self.index_file(file, store) {
                    Ok(chunks) => {
                        tracing::debug!(
                            path = %file.absolute_path.display(),
                            chunks,
                            "file indexed"
                        );
                        report.files_indexed += 1;
                        report.chunks_added += chunks;
                        on_event(IndexEvent::FileIndexed {
                            path: &file.absolute_path,
                            chunks,
                        });
                    }
                    Err(e) => {
                        tracing::error!(
                            path = %file.absolute_path.display(),
                            "failed to index file: {e}"
                        );
                        report.failures.push(FileFailure {
                            path: file.absolute_path.clone(),
                            reason: e.to_string(),
                        });
                        on_event(IndexEvent::FileFailed {
                            path: &file.absolute_path,
                        });
                    }
                }
            }

            match store.checkpoint() {
                Ok(()) => {
                    report.checkpoints += 1;
                    tracing::info!(
                        batch = batch_index + 1,
                        batches,
                        chunks = store.len(),
                        files = store.file_count(),
                        "checkpoint written"
                    );
                }
                Err(e) => {
                    report.checkpoint_errors += 1;
                    tracing::error!(
                        batch = batch_index + 1,
                        "checkpoint failed: {e}"
                    );
                }
            }
            on_event(IndexEvent::Checkpointed {
                batch: batch_index + 1,
                batches,
            });

            if batch_index + 1 < batches {
                pause(
                    Pause::BatchCooldown,
                    self.settings.batch_cooldown,
                    on_event,
                );
            }
        }

        tracing::info!(
            files = report.files_indexed,
            chunks = report.chunks_added,
            failures = report.failures.len(),
            "indexing finished"
        );
        report
    }

    /// Extract, chunk, embed and insert one file. The store is unchanged
    /// unless every step succeeds.
    fn index_file(
        &self,
        file: &DiscoveredFile,
        store: &mut IndexStore,
    ) -> Result<usize> {
        let segments = self.extractors.extract(&file.absolute_path)?;
        let chunks = chunk_segments(&segments, &self.settings.chunking)?;
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embedder.encode(&chunks)?
        };
        store.insert_file(&file.id(), chunks, vectors)
    }

    fn unavailable_reason(&self) -> SkipReason {
        SkipReason::EmbedderUnavailable(format!(
            "{} is not loaded",
            self.embedder.model_id()
        ))
    }
}

fn pause(
    pause: Pause,
    duration: Duration,
    on_event: &mut dyn FnMut(IndexEvent<'_>),
) {
    if !duration.is_zero() {
        on_event(IndexEvent::Paused { pause, duration });
        std::thread::sleep(duration);
    }
}
