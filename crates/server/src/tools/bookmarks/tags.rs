//! bookmarks_tags tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::{Engine, TagSummary};

use crate::tools::{json_result, read_error};

/// Parameters for the bookmarks_tags tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TagsParams {}

/// Output from the bookmarks_tags tool.
#[derive(Debug, Clone, Serialize)]
pub struct TagsOutput {
    /// Tags by descending use; `cached` marks tags with persisted pages.
    pub tags: Vec<TagSummary>,
}

/// Implementation of the bookmarks_tags tool.
pub async fn tags_impl(engine: &Engine, _params: TagsParams) -> Result<CallToolResult, McpError> {
    let tags = engine.tags().await.map_err(read_error)?;
    json_result(&TagsOutput { tags })
}
