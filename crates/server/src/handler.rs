//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker-backed implementations.

use std::sync::Arc;

use offgrid_core::Worker;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::cache::{CacheGetParams, get_impl, list_impl};
use crate::tools::clients::{connect_impl, disconnect_impl};
use crate::tools::lifecycle::{activate_impl, install_impl, status_impl};
use crate::tools::proxy_fetch::proxy_fetch_impl;
use crate::tools::signals::{client_message_impl, push_signal_impl, sync_signal_impl};
use crate::tools::{ClientDisconnectParams, ClientMessageParams, ProxyFetchParams, PushSignalParams, SyncSignalParams};

/// The main MCP server handler for offgrid.
#[derive(Clone)]
pub struct OffgridServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<Worker>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffgridServer {
    /// Create a new server handler around a worker.
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { tool_router: Self::tool_router(), worker }
    }

    #[tool(
        description = "Install the current generation: create its partitions and pre-cache the manifest. Activates right away when skip-waiting is set."
    )]
    async fn lifecycle_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Activate the installed generation: delete old partitions and claim open clients.")]
    async fn lifecycle_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(
        description = "Report lifecycle state, current version, partitions in the store, connected client ids and registered sync tags."
    )]
    async fn lifecycle_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(
        description = "Register a client page. Returns the client_id to pass to proxy_fetch and whether this instance controls it yet."
    )]
    async fn client_connect(&self) -> Result<CallToolResult, McpError> {
        connect_impl(&self.worker).await
    }

    #[tool(description = "Forget a client registered with client_connect.")]
    async fn client_disconnect(&self, params: Parameters<ClientDisconnectParams>) -> Result<CallToolResult, McpError> {
        disconnect_impl(&self.worker, params.0).await
    }

    /// Intercept a request.
    ///
    /// Data files are served from cache and refreshed in the background,
    /// documents go network first, everything else cache first.
    #[tool(
        description = "Send a request through the caching proxy. Returns status, response kind, headers, body and whether it came from cache or network."
    )]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        proxy_fetch_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Deliver a control message: {\"type\":\"skip-waiting\"} or {\"type\":\"prime-named-entry\",\"key\":...,\"payload\":...}. Unknown messages are ignored."
    )]
    async fn client_message(&self, params: Parameters<ClientMessageParams>) -> Result<CallToolResult, McpError> {
        client_message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Deliver a push signal with an optional text payload and broadcast the resulting notice.")]
    async fn push_signal(&self, params: Parameters<PushSignalParams>) -> Result<CallToolResult, McpError> {
        push_signal_impl(&self.worker, params.0)
    }

    #[tool(description = "Deliver a periodic-sync signal. Known tags broadcast a data-changed message to clients.")]
    async fn sync_signal(&self, params: Parameters<SyncSignalParams>) -> Result<CallToolResult, McpError> {
        sync_signal_impl(&self.worker, params.0).await
    }

    #[tool(description = "List cache partitions with entry counts.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.worker).await
    }

    #[tool(description = "Fetch a stored cache entry by URL, optionally within one partition. Fails with CACHE_MISS.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for OffgridServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offgrid".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Offline-first caching proxy. Run lifecycle_install once, then send requests with proxy_fetch.".into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::worker;

    #[test]
    fn test_all_tools_registered() {
        let server = OffgridServer::new(worker(&[], true));
        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_get",
                "cache_list",
                "client_connect",
                "client_disconnect",
                "client_message",
                "lifecycle_activate",
                "lifecycle_install",
                "lifecycle_status",
                "proxy_fetch",
                "push_signal",
                "sync_signal",
            ]
        );
    }

    #[test]
    fn test_server_info() {
        let info = OffgridServer::new(worker(&[], true)).get_info();
        assert_eq!(info.server_info.name, "offgrid");
    }
}
