//! cache_list tool implementation.

use offgrid_core::Worker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: u64,
    /// Whether the partition belongs to the current generation.
    pub current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub backend: String,
    pub partitions: Vec<PartitionSummary>,
}

pub async fn list_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let caches = worker.caches();
    let mut partitions = Vec::new();
    for name in caches.partitions().await? {
        let entries = caches.partition(&name).len().await?;
        let current = worker.config().is_current(&name);
        partitions.push(PartitionSummary { name, entries, current });
    }

    json_result(&CacheListOutput { backend: caches.backend().to_string(), partitions })
}
