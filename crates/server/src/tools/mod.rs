//! MCP tool implementations.
//!
//! Read tools live in [`bookmarks`]; refresh, invalidation and stats in
//! [`cache`]. Every tool answers with one pretty-printed JSON text block.

pub mod bookmarks;
pub mod cache;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use tidemark_core::Error;

/// Serialize a tool output into a successful result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::Serialization(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Map an engine read failure for a read tool.
///
/// Input errors pass through; anything else means no tier had data, so the
/// caller sees `NO_DATA` rather than lock or store internals.
pub(crate) fn read_error(err: Error) -> McpError {
    match err {
        Error::InvalidInput(_) => err.into(),
        other => {
            tracing::warn!(error = %other, "read tool found no data");
            Error::NoData(format!("no bookmarks available: {other}")).into()
        }
    }
}
