//! Text extraction from source documents.
//!
//! Each extractor declares the file extensions it handles. Discovery only
//! yields files whose extension has an available extractor, so a missing
//! parser means the file is never a candidate rather than a failure.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use crate::error::{Error, Result};

/// Form feed, emitted by PDF text extraction between pages.
const PAGE_BREAK: char = '\u{000C}';

/// Produces plain-text segments (pages, sections) from a file.
pub trait TextExtractor: Send + Sync {
    /// Lowercase file extensions, without the leading dot.
    fn extensions(&self) -> &[&'static str];

    /// Whether the underlying parser can be used.
    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>>;
}

/// Reads `.txt` and `.md` files as a single UTF-8 segment.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(vec![content])
    }
}

/// Extracts text from `.pdf` files, one segment per page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        // pdf-extract panics on some malformed documents.
        let extracted =
            std::panic::catch_unwind(|| pdf_extract::extract_text(path))
                .map_err(|_| Error::Extraction {
                    path: path.to_path_buf(),
                    reason: "PDF parser panicked".to_string(),
                })?
                .map_err(|e| Error::Extraction {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;

        Ok(split_pages(&extracted))
    }
}

fn split_pages(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK)
        .filter(|page| !page.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Maps file extensions to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: BTreeMap<String, Arc<dyn TextExtractor>>,
}

impl Default for ExtractorRegistry {
    /// Plain text, markdown and PDF.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PlainTextExtractor));
        registry.register(Arc::new(PdfExtractor));
        registry
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            by_extension: BTreeMap::new(),
        }
    }

    /// Register an extractor for all its extensions, replacing any previous
    /// extractor for the same extension. Unavailable extractors are ignored.
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        if !extractor.is_available() {
            tracing::warn!(
                extensions = ?extractor.extensions(),
                "text extractor unavailable; files of this type will be skipped"
            );
            return;
        }
        for ext in extractor.extensions() {
            self.by_extension
                .insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    /// Extensions with a registered extractor, sorted.
    pub fn extensions(&self) -> Vec<String> {
        self.by_extension.keys().cloned().collect()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn TextExtractor> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).map(|e| e.as_ref())
    }

    /// Extract text segments from `path` with the matching extractor.
    pub fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let extractor =
            self.for_path(path).ok_or_else(|| Error::Unavailable {
                capability: "text extractor",
                reason: format!("no parser for {}", path.display()),
            })?;
        extractor.extract(path)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}
