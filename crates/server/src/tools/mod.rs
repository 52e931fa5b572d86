//! MCP tool implementations.
//!
//! Each tool is a thin adapter: parse parameters, call the [`Worker`],
//! serialize the result as pretty JSON text content.

pub mod cache;
pub mod clients;
pub mod lifecycle;
pub mod proxy_fetch;
pub mod signals;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ProxyToolError;

pub use clients::ClientDisconnectParams;
pub use proxy_fetch::ProxyFetchParams;
pub use signals::{ClientMessageParams, PushSignalParams, SyncSignalParams};

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ProxyToolError::Serialize(format!("failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
