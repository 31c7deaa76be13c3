//! engine_stats tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::Engine;

use crate::tools::json_result;

/// Parameters for the engine_stats tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatsParams {}

/// Implementation of the engine_stats tool.
pub async fn stats_impl(engine: &Engine, _params: StatsParams) -> Result<CallToolResult, McpError> {
    json_result(&engine.stats())
}
