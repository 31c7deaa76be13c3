//! cache_invalidate tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::{Engine, InvalidateScope};

use crate::tools::json_result;

/// What to clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// This process's memory cache only.
    #[default]
    Memory,
    /// Every persisted tag collection.
    Tags,
    /// All persisted collection records (the refresh lock is kept).
    All,
}

impl From<Scope> for InvalidateScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Memory => InvalidateScope::Memory,
            Scope::Tags => InvalidateScope::Tags,
            Scope::All => InvalidateScope::All,
        }
    }
}

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InvalidateParams {
    /// One of "memory", "tags" or "all" (default "memory").
    #[serde(default)]
    pub scope: Scope,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(engine: &Engine, params: InvalidateParams) -> Result<CallToolResult, McpError> {
    let report = engine.invalidate(params.scope.into()).await?;
    json_result(&report)
}
