//! MCP server handler implementation.
//!
//! Routes tool calls to the implementations in [`crate::tools`], all sharing
//! one [`Engine`].

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tidemark_client::Engine;

use crate::tools::bookmarks::{
    CollectionParams, IndexParams, PageParams, TagPageParams, TagsParams, collection_impl, index_impl, page_impl,
    tag_page_impl, tags_impl,
};
use crate::tools::cache::{InvalidateParams, RefreshParams, StatsParams, invalidate_impl, refresh_impl, stats_impl};

/// The MCP server handler for tidemark.
#[derive(Clone)]
pub struct TidemarkServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TidemarkServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(description = "Return the full bookmark collection from the fastest cache tier that has it. \
                          Refreshes from the source API only when nothing is cached, unless skip_upstream is set.")]
    async fn bookmarks_collection(&self, params: Parameters<CollectionParams>) -> Result<CallToolResult, McpError> {
        collection_impl(&self.engine, params.0).await
    }

    #[tool(description = "Return one 1-based page of the bookmark collection. Pages past the end are empty.")]
    async fn bookmarks_page(&self, params: Parameters<PageParams>) -> Result<CallToolResult, McpError> {
        page_impl(&self.engine, params.0).await
    }

    #[tool(description = "Return one 1-based page of the bookmarks carrying a tag, by slug or display name.")]
    async fn bookmarks_tag_page(&self, params: Parameters<TagPageParams>) -> Result<CallToolResult, McpError> {
        tag_page_impl(&self.engine, params.0).await
    }

    #[tool(description = "Return the collection index (count, totalPages, pageSize, checksum, timestamps), \
                          globally or for one tag.")]
    async fn bookmarks_index(&self, params: Parameters<IndexParams>) -> Result<CallToolResult, McpError> {
        index_impl(&self.engine, params.0).await
    }

    #[tool(description = "List tags in the collection by descending use, marking those with cached pages.")]
    async fn bookmarks_tags(&self, params: Parameters<TagsParams>) -> Result<CallToolResult, McpError> {
        tags_impl(&self.engine, params.0).await
    }

    #[tool(description = "Refresh the collection from the source API and persist it. \
                          Skipped when another instance holds the refresh lock; force rewrites unchanged data.")]
    async fn bookmarks_refresh(&self, params: Parameters<RefreshParams>) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.engine, params.0).await
    }

    #[tool(description = "Clear cached state: memory (this process), tags (persisted tag pages) or all.")]
    async fn cache_invalidate(&self, params: Parameters<InvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.engine, params.0).await
    }

    #[tool(description = "Return engine counters: refreshes, lock contention, fallbacks, image persistence.")]
    async fn engine_stats(&self, params: Parameters<StatsParams>) -> Result<CallToolResult, McpError> {
        stats_impl(&self.engine, params.0).await
    }
}

impl ServerHandler for TidemarkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tidemark".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
