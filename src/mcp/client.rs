// ABOUTME: MCP client for connecting to an upstream MCP server over stdio.
// ABOUTME: Covers the handshake, paginated tool listing, tool calls and events.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::transport::{StdioTransport, Transport, TransportEvent};
use super::{
    LATEST_PROTOCOL_VERSION, McpClientInfo, McpInitializeParams, McpInitializeResult,
    McpNotification, McpRequest, McpServerCapabilities, McpServerConfig, McpToolInfo,
    McpToolsListResult, McpTransport,
};
use crate::error::McpError;

/// Client for communicating with an MCP server.
pub struct McpClient {
    config: McpServerConfig,
    transport: Arc<dyn Transport>,
    capabilities: McpServerCapabilities,
}

impl McpClient {
    /// Connect to an MCP server.
    pub async fn connect(config: McpServerConfig) -> Result<Self, McpError> {
        let transport: Arc<dyn Transport> = match &config.transport {
            McpTransport::Stdio {
                command,
                args,
                env,
                cwd,
            } => Arc::new(
                StdioTransport::connect(command, args, env, cwd.as_deref(), config.request_timeout)
                    .await?,
            ),
        };

        Ok(Self::with_transport(config, transport))
    }

    /// Build a client over an already-established transport.
    pub fn with_transport(config: McpServerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            capabilities: McpServerCapabilities::default(),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the server capabilities (available after initialize).
    pub fn capabilities(&self) -> &McpServerCapabilities {
        &self.capabilities
    }

    /// Send a request and wait for response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let request = McpRequest::new(method, params);
        let response = self.transport.send(request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("No result in response".into()))
    }

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), McpError> {
        let notification = McpNotification::new(method, params);
        self.transport.notify(notification).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the MCP connection.
    pub async fn initialize(
        &mut self,
        client_info: McpClientInfo,
    ) -> Result<McpInitializeResult, McpError> {
        let params = McpInitializeParams {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({
                "tools": {},
                "logging": {}
            }),
            client_info,
        };

        let result = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        let init_result: McpInitializeResult = serde_json::from_value(result)?;

        // Store capabilities for later use
        self.capabilities = init_result.capabilities.clone();

        // Send initialized notification
        self.notify("notifications/initialized", None).await?;

        Ok(init_result)
    }

    /// Take the stream of notifications and close events from the server.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.transport.take_events().await
    }

    /// Shutdown the server connection gracefully.
    pub async fn shutdown(&self) -> Result<(), McpError> {
        self.transport.shutdown().await
    }

    // ========================================================================
    // Tools
    // ========================================================================

    /// List available tools from the server, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: McpToolsListResult = serde_json::from_value(result)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if cursor.as_ref() != Some(&next) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Call a tool on the server and return its raw result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        self.request("tools/call", Some(params)).await
    }
}
