use std::{path::PathBuf, sync::Arc};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    embedding::Embedder,
    error,
    search::{DEFAULT_TOP_K, QueryEngine, SearchHit},
    store::{IndexStore, StoreStatus},
};

/// Upper bound on `limit`, so a single call cannot dump the whole store.
const MAX_SEARCH_LIMIT: usize = 50;

struct DocvecState {
    store_dir: PathBuf,
    embedder: Box<dyn Embedder>,
}

impl DocvecState {
    /// Read the latest checkpoint. A store that cannot be read counts as
    /// missing; it is left on disk for the next indexing run to deal with.
    fn load_store(&self) -> Option<IndexStore> {
        match IndexStore::load(&self.store_dir) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("index store unavailable: {e}");
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct DocvecMcpServer {
    state: Arc<DocvecState>,
    tool_router: ToolRouter<Self>,
}

impl DocvecMcpServer {
    pub fn new(store_dir: PathBuf, embedder: Box<dyn Embedder>) -> Self {
        Self {
            state: Arc::new(DocvecState {
                store_dir,
                embedder,
            }),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DocvecMcpServer {
    /// Retrieve the chunks most similar to a query.
    #[tool(
        name = "docvec_search",
        description = "Semantic search over the indexed documents. Returns the most similar text chunks with their source file; an empty result means nothing relevant is indexed."
    )]
    pub async fn docvec_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_TOP_K)
            .min(MAX_SEARCH_LIMIT);

        let store = self.state.load_store();
        let engine =
            QueryEngine::new(store.as_ref(), self.state.embedder.as_ref());
        let hits = engine.search(&params.query, limit);

        let summary = format_search_summary(&hits, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: hits.len(),
            results: hits,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }

    /// Report the embedder and index store state.
    #[tool(
        name = "docvec_status",
        description = "Show the active embedding model and how many chunks and files are indexed."
    )]
    pub async fn docvec_status(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let status = StatusResponse {
            model: self.state.embedder.model_id().to_string(),
            embedder_available: self.state.embedder.is_available(),
            store: StoreStatus::inspect(&self.state.store_dir),
        };

        let summary = format!(
            "Model: {} ({})\nIndex: {}",
            status.model,
            if status.embedder_available {
                "available"
            } else {
                "unavailable"
            },
            status.store
        );
        let structured = serde_json::to_value(&status)
            .map_err(|e| mcp_error("failed to serialize status", e))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DocvecMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "docvec".to_string(),
                title: Some("docvec MCP".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use docvec_search to retrieve passages from the user's documents that are semantically related to a question."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Maximum number of results (default: 3, at most 50).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    model: String,
    embedder_available: bool,
    store: StoreStatus,
}

fn format_search_summary(hits: &[SearchHit], query: &str) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(hits.len() * 2 + 1);
    let suffix = if hits.len() == 1 { "" } else { "s" };
    lines.push(format!("Found {} result{} for \"{query}\":", hits.len(), suffix));

    for hit in hits {
        lines.push(format!(
            "[{:.4}] {} #{}",
            hit.distance, hit.source, hit.position
        ));
        lines.push(hit.content.clone());
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(
    store_dir: PathBuf,
    embedder: Box<dyn Embedder>,
) -> error::Result<()> {
    let server = DocvecMcpServer::new(store_dir, embedder);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn indexed_store(dir: &std::path::Path, embedder: &HashingEmbedder) {
        let mut store = IndexStore::open(dir, embedder.dimension()).unwrap();
        for (source, text) in [
            ("/docs/a.txt", "organoid cancer therapy"),
            ("/docs/b.txt", "unrelated weather data"),
        ] {
            let chunks = vec![text.to_string()];
            let vectors = embedder.encode(&chunks).unwrap();
            store.insert_file(source, chunks, vectors).unwrap();
        }
        store.checkpoint().unwrap();
    }

    fn summary_text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn search_tool_returns_structured_results() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        indexed_store(tmp.path(), &embedder);

        let server =
            DocvecMcpServer::new(tmp.path().to_path_buf(), Box::new(embedder));
        let params = SearchParams {
            query: "cancer treatment".to_string(),
            limit: Some(1),
        };
        let result = server.docvec_search(Parameters(params)).await.unwrap();

        let structured = result.structured_content.clone().expect("structured");
        assert_eq!(structured["resultCount"], 1);
        let results = structured["results"].as_array().expect("results array");
        assert_eq!(results[0]["source"], "/docs/a.txt");
        assert_eq!(results[0]["content"], "organoid cancer therapy");

        assert!(summary_text(&result).contains("Found 1 result"));
    }

    #[tokio::test]
    async fn zero_limit_returns_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        indexed_store(tmp.path(), &embedder);

        let server =
            DocvecMcpServer::new(tmp.path().to_path_buf(), Box::new(embedder));
        let params = SearchParams {
            query: "cancer treatment".to_string(),
            limit: Some(0),
        };
        let result = server.docvec_search(Parameters(params)).await.unwrap();

        let structured = result.structured_content.clone().expect("structured");
        assert_eq!(structured["resultCount"], 0);
    }

    #[tokio::test]
    async fn search_without_store_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let server = DocvecMcpServer::new(
            tmp.path().join("store"),
            Box::new(HashingEmbedder::default()),
        );
        let params = SearchParams {
            query: "anything".to_string(),
            limit: None,
        };
        let result = server.docvec_search(Parameters(params)).await.unwrap();

        let structured = result.structured_content.clone().expect("structured");
        assert_eq!(structured["resultCount"], 0);
        assert!(summary_text(&result).starts_with("No results found"));
    }

    #[tokio::test]
    async fn status_tool_reports_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::new(16);
        indexed_store(tmp.path(), &embedder);

        let server =
            DocvecMcpServer::new(tmp.path().to_path_buf(), Box::new(embedder));
        let result = server.docvec_status().await.unwrap();

        let structured = result.structured_content.clone().expect("structured");
        assert_eq!(structured["model"], "hashing-16");
        assert_eq!(structured["embedderAvailable"], true);
        assert_eq!(structured["store"]["state"], "ready");
        assert_eq!(structured["store"]["chunks"], 2);
        assert_eq!(structured["store"]["files"], 2);
    }
}
