//! proxy_fetch tool implementation.
//!
//! Runs one intercepted request through the worker and reports what the
//! page would have received.

use std::collections::BTreeMap;

use offgrid_core::worker::Source;
use offgrid_core::{Destination, Request, RequestMode, ResourceClass, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ProxyToolError;

/// Input parameters for the proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET). Anything else bypasses the cache.
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub destination: Option<Destination>,

    #[serde(default)]
    pub mode: Option<RequestMode>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Id of the client issuing the request, as returned by client_connect.
    /// Omitted means the host itself.
    #[serde(default)]
    pub client_id: Option<u64>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    pub url: String,
    pub status: u16,
    pub kind: String,
    pub redirected: bool,
    /// Absent when the request bypassed classification.
    pub class: Option<ResourceClass>,
    pub source: Source,
    pub headers: BTreeMap<String, String>,
    /// Body as text; absent for non UTF-8 bodies.
    pub body: Option<String>,
    pub body_len: usize,
}

pub async fn proxy_fetch_impl(worker: &Worker, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    let method = params.method.trim();
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ProxyToolError::InvalidInput(format!("invalid method: {:?}", params.method)).into());
    }

    let url = worker.config().resolve(&params.url).map_err(ProxyToolError::from)?;

    let mut request = Request::new(method, url)
        .with_destination(params.destination.unwrap_or_default())
        .with_mode(params.mode.unwrap_or_default());
    for (name, value) in &params.headers {
        request = request.with_header(name, value.as_str());
    }
    if let Some(client) = params.client_id {
        if !worker.clients().contains(client).await {
            return Err(ProxyToolError::InvalidInput(format!(
                "unknown client_id {client}; register one with client_connect"
            ))
            .into());
        }
        request = request.with_client(client);
    }

    let served = worker.intercept(&request).await?;
    let response = served.response;

    let output = ProxyFetchOutput {
        url: response.url.clone(),
        status: response.status,
        kind: response.kind.to_string(),
        redirected: response.redirected,
        class: served.class,
        source: served.source,
        body: std::str::from_utf8(&response.body).ok().map(str::to_string),
        body_len: response.body.len(),
        headers: response.headers,
    };
    json_result(&output)
}
