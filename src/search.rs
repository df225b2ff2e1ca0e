use serde::Serialize;

use crate::{
    embedding::Embedder,
    store::IndexStore,
    text_util::{DEFAULT_PREVIEW_MAX_CHARS, preview},
};

/// Number of hits returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 3;

/// A retrieved chunk with its origin and squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub source: String,
    pub position: u32,
    pub distance: f32,
}

/// Answers similarity queries against an [`IndexStore`].
///
/// Never fails: when there is nothing to search or the query cannot be
/// embedded, the result is simply empty.
pub struct QueryEngine<'a> {
    store: Option<&'a IndexStore>,
    embedder: &'a dyn Embedder,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: Option<&'a IndexStore>, embedder: &'a dyn Embedder) -> Self {
        Self { store, embedder }
    }

    /// Whether a search can return anything at all.
    pub fn is_available(&self) -> bool {
        self.embedder.is_available()
            && self
                .store
                .is_some_and(|s| s.dimension() == self.embedder.dimension())
    }

    /// Up to `k` chunks nearest to `query`, closest first.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let Some(store) = self.store else {
            tracing::info!("no index store; returning no results");
            return Vec::new();
        };
        if !self.embedder.is_available() {
            tracing::warn!(
                model = self.embedder.model_id(),
                "embedding model unavailable; returning no results"
            );
            return Vec::new();
        }
        if k == 0 || store.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embedder.encode_one(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("failed to embed query: {e}");
                return Vec::new();
            }
        };

        let neighbors = match store.search(&query_vector, k) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("vector search failed: {e}");
                return Vec::new();
            }
        };

        neighbors
            .into_iter()
            .filter_map(|n| {
                store.chunk(n.ordinal).map(|chunk| SearchHit {
                    content: chunk.content.clone(),
                    source: chunk.source.clone(),
                    position: chunk.position,
                    distance: n.distance,
                })
            })
            .collect()
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. [{:.4}] {} #{}",
            i + 1,
            hit.distance,
            hit.source,
            hit.position
        );
        println!("     {}", preview(&hit.content, DEFAULT_PREVIEW_MAX_CHARS));
    }
    println!("\n{} result(s)", hits.len());
}

#[derive(Serialize)]
struct JsonResults<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [SearchHit],
}

/// Results as a JSON document.
pub fn to_json(hits: &[SearchHit], query: &str) -> serde_json::Result<String> {
    serde_json::to_string(&JsonResults {
        query,
        result_count: hits.len(),
        results: hits,
    })
}
