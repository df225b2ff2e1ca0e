//! docvec - an incrementally updated local vector index over your documents.
//!
//! docvec walks a set of source folders (by default your OneDrive folder),
//! splits new `.txt`, `.md` and `.pdf` files into overlapping chunks, embeds
//! them, and keeps an exact L2 vector index on disk. Queries return the
//! chunks nearest to the query embedding together with their source file.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use docvec::{
//!     DataDir, ExtractorRegistry, IndexStore, QueryEngine,
//!     embedding::HashingEmbedder,
//!     indexer::{IndexSettings, Indexer},
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let embedder = HashingEmbedder::default();
//! let extractors = ExtractorRegistry::default();
//!
//! let roots = vec![PathBuf::from("/home/me/OneDrive")];
//! let indexer =
//!     Indexer::new(&embedder, &extractors, IndexSettings::default()).unwrap();
//! let report = indexer
//!     .run_in(&roots, &data_dir.store_dir(), &mut |_| {})
//!     .unwrap();
//! println!("indexed {} files", report.files_indexed);
//!
//! let store = IndexStore::load(&data_dir.store_dir()).unwrap();
//! for hit in QueryEngine::new(store.as_ref(), &embedder).search("cancer treatment", 3) {
//!     println!("{:.3} {}", hit.distance, hit.source);
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod lock;
pub mod mcp;
pub mod model_manager;
pub mod search;
pub mod store;
pub mod text_util;
pub mod vector_index;
pub mod walker;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use embedding::{Embedder, EmbedderKind};
pub use error::{Error, Result};
pub use extract::ExtractorRegistry;
pub use indexer::{IndexReport, Indexer};
pub use model_manager::ModelManager;
pub use search::{QueryEngine, SearchHit};
pub use store::IndexStore;
pub use vector_index::FlatL2Index;
