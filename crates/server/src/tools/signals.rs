//! client_message, push_signal and sync_signal.
//!
//! None of these fail on bad input: unknown messages and tags are reported
//! as ignored.

use offgrid_core::Worker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientMessageParams {
    /// Message body, e.g. `{"type": "skip-waiting"}`.
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushSignalParams {
    /// Optional text payload of the push.
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncSignalParams {
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
struct SyncOutput {
    tag: String,
    handled: bool,
}

pub async fn client_message_impl(worker: &Worker, params: ClientMessageParams) -> Result<CallToolResult, McpError> {
    let outcome = worker.on_message(&params.data).await;
    json_result(&outcome)
}

pub fn push_signal_impl(worker: &Worker, params: PushSignalParams) -> Result<CallToolResult, McpError> {
    let notice = worker.on_push(params.payload.as_deref());
    json_result(&notice)
}

pub async fn sync_signal_impl(worker: &Worker, params: SyncSignalParams) -> Result<CallToolResult, McpError> {
    let handled = worker.on_sync(&params.tag).await;
    json_result(&SyncOutput { tag: params.tag, handled })
}
