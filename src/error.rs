use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("{capability} unavailable: {reason}")]
    Unavailable {
        capability: &'static str,
        reason: String,
    },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index store is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("source path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error(
        "invalid chunking parameters: overlap {overlap} must be smaller than chunk size {chunk_size}"
    )]
    InvalidChunking { chunk_size: usize, overlap: usize },

    #[error("another indexing run holds the store lock: {0}")]
    Locked(PathBuf),
}

impl Error {
    pub fn embedding_unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: "embedding model",
            reason: reason.into(),
        }
    }

    /// True for degraded-capability conditions, which callers treat as
    /// "no result" rather than as failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
