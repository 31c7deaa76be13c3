//! bookmarks_collection tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::{CollectionOptions, Engine};
use tidemark_core::model::Bookmark;

use crate::tools::{json_result, read_error};

/// Parameters for the bookmarks_collection tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CollectionParams {
    /// Only serve persisted data; never call the upstream API.
    #[serde(default)]
    pub skip_upstream: bool,

    /// Include preview image URLs (default true).
    #[serde(default = "default_true")]
    pub include_images: bool,
}

fn default_true() -> bool {
    true
}

/// Output from the bookmarks_collection tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionOutput {
    pub count: usize,
    pub bookmarks: Vec<Bookmark>,
}

/// Implementation of the bookmarks_collection tool.
pub async fn collection_impl(engine: &Engine, params: CollectionParams) -> Result<CallToolResult, McpError> {
    let options = CollectionOptions { skip_upstream: params.skip_upstream, include_images: params.include_images };
    let bookmarks = engine.get_collection(options).await.map_err(read_error)?;

    json_result(&CollectionOutput { count: bookmarks.len(), bookmarks: bookmarks.to_vec() })
}
