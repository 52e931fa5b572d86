//! cache_get tool implementation.
//!
//! Retrieves a stored entry by partition and request URL.

use std::collections::BTreeMap;

use offgrid_core::{Error, Request, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ProxyToolError;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Partition name; defaults to searching every partition in creation order.
    #[serde(default)]
    pub partition: Option<String>,

    /// Request URL, absolute or origin-relative.
    pub url: String,

    /// Values for the configured vary headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub hash: String,
    pub url: String,
    pub status: u16,
    pub kind: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub body_len: usize,
    /// RFC 3339 write time; absent for cross-partition lookups.
    pub stored_at: Option<String>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &Worker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = worker.config().resolve(&params.url).map_err(ProxyToolError::from)?;
    let mut request = Request::get(url);
    for (name, value) in &params.headers {
        request = request.with_header(name, value.as_str());
    }
    let key = worker.config().key_for(&request);

    let (response, stored_at) = match &params.partition {
        Some(name) => match worker.caches().partition(name).entry(&key).await? {
            Some(entry) => (Some(entry.response), Some(entry.stored_at)),
            None => (None, None),
        },
        None => (worker.caches().match_any(&key).await?, None),
    };
    let response = response.ok_or_else(|| Error::CacheMiss(key.url.clone()))?;

    let output = CacheGetOutput {
        hash: key.hash,
        url: key.url,
        status: response.status,
        kind: response.kind.to_string(),
        body: std::str::from_utf8(&response.body).ok().map(str::to_string),
        body_len: response.body.len(),
        headers: response.headers,
        stored_at,
    };
    json_result(&output)
}
