//! lifecycle_install, lifecycle_activate and lifecycle_status.

use offgrid_core::{LifecycleState, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;

use super::json_result;

/// Output from the lifecycle_status tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatusOutput {
    pub state: LifecycleState,
    pub version: String,
    pub static_partition: String,
    pub dynamic_partition: String,
    /// Every partition in the store, in creation order.
    pub partitions: Vec<String>,
    pub backend: String,
    /// Connected client ids; the host registers itself at startup.
    pub client_ids: Vec<u64>,
    /// Tags `sync_signal` will act on.
    pub sync_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PhaseOutput<T: Serialize> {
    state: LifecycleState,
    #[serde(flatten)]
    outcome: T,
}

pub async fn install_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let outcome = worker.install().await?;
    json_result(&PhaseOutput { state: worker.state(), outcome })
}

pub async fn activate_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await?;
    json_result(&PhaseOutput { state: worker.state(), outcome: report })
}

pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let config = worker.config();
    let output = StatusOutput {
        state: worker.state(),
        version: config.version.clone(),
        static_partition: config.static_partition.clone(),
        dynamic_partition: config.dynamic_partition.clone(),
        partitions: worker.caches().partitions().await?,
        backend: worker.caches().backend().to_string(),
        client_ids: worker.clients().ids().await,
        sync_tags: worker.sync_tags().into_iter().map(str::to_string).collect(),
    };
    json_result(&output)
}
