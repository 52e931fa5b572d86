//! client_connect and client_disconnect.
//!
//! Ids handed out here are what `proxy_fetch` accepts as `client_id`.

use offgrid_core::Worker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientDisconnectParams {
    pub client_id: u64,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
struct ConnectOutput {
    client_id: u64,
    /// False until the instance is active and claims it.
    controlled: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
struct DisconnectOutput {
    client_id: u64,
    disconnected: bool,
}

pub async fn connect_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let client_id = worker.connect_client().await;
    let controlled = worker.clients().is_controlled(client_id).await;
    json_result(&ConnectOutput { client_id, controlled })
}

pub async fn disconnect_impl(worker: &Worker, params: ClientDisconnectParams) -> Result<CallToolResult, McpError> {
    let disconnected = worker.disconnect_client(params.client_id).await;
    json_result(&DisconnectOutput { client_id: params.client_id, disconnected })
}
