//! bookmarks_refresh tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::Engine;

use crate::tools::json_result;

/// Parameters for the bookmarks_refresh tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RefreshParams {
    /// Rewrite even if the collection checksum is unchanged.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    /// This call ran or joined a refresh cycle.
    Completed,
    /// Another refresh holds the lock.
    Skipped,
}

/// Output from the bookmarks_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshOutput {
    pub status: RefreshStatus,
    /// Bookmarks in the collection the cycle answered with.
    pub count: Option<usize>,
}

/// Implementation of the bookmarks_refresh tool.
///
/// Unlike the read tools, a failed cycle with nothing to fall back on is
/// reported as the upstream error.
pub async fn refresh_impl(engine: &Engine, params: RefreshParams) -> Result<CallToolResult, McpError> {
    let output = match engine.refresh(params.force).await? {
        Some(collection) => RefreshOutput { status: RefreshStatus::Completed, count: Some(collection.len()) },
        None => RefreshOutput { status: RefreshStatus::Skipped, count: None },
    };

    json_result(&output)
}
