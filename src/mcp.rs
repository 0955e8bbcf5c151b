use std::sync::Arc;

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
    error,
    retriever::{Passage, Retriever},
};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const SUMMARY_PREVIEW_CHARS: usize = 160;

#[derive(Clone)]
pub struct DocwellMcpServer {
    retriever: Arc<Retriever>,
    tool_router: ToolRouter<Self>,
}

impl DocwellMcpServer {
    /// Serve searches from an already loaded retriever.
    pub fn new(retriever: Retriever) -> Self {
        Self {
            retriever: Arc::new(retriever),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl DocwellMcpServer {
    /// Retrieve the passages closest to a query.
    #[tool(
        name = "docwell_search",
        description = "Retrieve document passages relevant to a question. Returns passage text with its source file, in the order to use as context."
    )]
    pub async fn docwell_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let retriever = Arc::clone(&self.retriever);
        let query = params.query.clone();
        let passages = tokio::task::spawn_blocking(move || {
            retriever.search_passages(&query, limit)
        })
        .await
        .map_err(|e| mcp_error("search task failed", e))?
        .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_summary(&passages, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: passages.len(),
            results: passages,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DocwellMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("docwell", env!("CARGO_PKG_VERSION"))
                    .with_title("docwell MCP"),
            )
            .with_instructions(
                "Use docwell_search to fetch passages that ground an answer. Pass the user's question as the query.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Number of nearest chunks to retrieve (default: 10).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<Passage>,
}

fn format_search_summary(passages: &[Passage], query: &str) -> String {
    if passages.is_empty() {
        return format!("No passages found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(passages.len() + 1);
    let suffix = if passages.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} passage{} for \"{query}\":",
        passages.len(),
        suffix
    ));

    for passage in passages {
        lines.push(format!(
            "[{}] {}: {}",
            passage.position,
            passage.source,
            preview(&passage.text)
        ));
    }

    lines.join("\n")
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SUMMARY_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve `docwell_search` over stdio until the client disconnects.
pub fn run_mcp(retriever: Retriever) -> error::Result<()> {
    let server = DocwellMcpServer::new(retriever);

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
