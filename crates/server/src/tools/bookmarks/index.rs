//! bookmarks_index tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tidemark_client::Engine;

use crate::tools::{json_result, read_error};

/// Parameters for the bookmarks_index tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexParams {
    /// Tag slug or name; omit for the global collection index.
    #[serde(default)]
    pub tag: Option<String>,
}

/// Implementation of the bookmarks_index tool.
pub async fn index_impl(engine: &Engine, params: IndexParams) -> Result<CallToolResult, McpError> {
    let index = match params.tag.as_deref() {
        Some(tag) => engine.get_tag_index(tag).await,
        None => engine.get_index().await,
    }
    .map_err(read_error)?;

    json_result(&index)
}

#[cfg(test)]
mod tests {
    use tidemark_core::testing::{bookmark, collection};

    use super::*;
    use crate::tools::test_support::{engine, output};

    #[tokio::test]
    async fn test_global_index() {
        let engine = engine(collection(41)).await;
        engine.refresh(false).await.unwrap();

        let result = index_impl(&engine, IndexParams { tag: None }).await.unwrap();
        let out = output(&result);
        assert_eq!(out["count"], 41);
        assert_eq!(out["totalPages"], 3);
        assert_eq!(out["pageSize"], 20);
        assert!(out["checksum"].as_str().is_some_and(|c| c.len() == 64));
    }

    #[tokio::test]
    async fn test_tag_index() {
        let items = vec![bookmark("a", 1, &["rust"]), bookmark("b", 2, &["rust"]), bookmark("c", 3, &[])];
        let engine = engine(items).await;
        engine.refresh(false).await.unwrap();

        let result = index_impl(&engine, IndexParams { tag: Some("Rust".into()) }).await.unwrap();
        assert_eq!(output(&result)["count"], 2);
    }
}
