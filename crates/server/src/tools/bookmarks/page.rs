//! bookmarks_page and bookmarks_tag_page tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::Engine;
use tidemark_core::model::{Page, slugify};

use crate::tools::{json_result, read_error};

/// Parameters for the bookmarks_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageParams {
    /// 1-based page number.
    pub page: usize,
}

/// Parameters for the bookmarks_tag_page tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TagPageParams {
    /// Tag slug or display name (e.g. "machine-learning" or "Machine Learning").
    pub tag: String,

    /// 1-based page number.
    pub page: usize,
}

/// Output from the bookmarks_tag_page tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagPageOutput {
    /// Slug the tag resolved to.
    pub tag: String,
    #[serde(flatten)]
    pub page: Page,
}

/// Implementation of the bookmarks_page tool.
pub async fn page_impl(engine: &Engine, params: PageParams) -> Result<CallToolResult, McpError> {
    let page = engine.get_page(params.page).await.map_err(read_error)?;
    json_result(&page)
}

/// Implementation of the bookmarks_tag_page tool.
pub async fn tag_page_impl(engine: &Engine, params: TagPageParams) -> Result<CallToolResult, McpError> {
    let page = engine.get_tag_page(&params.tag, params.page).await.map_err(read_error)?;
    json_result(&TagPageOutput { tag: slugify(&params.tag), page })
}
