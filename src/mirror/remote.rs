// ABOUTME: Remote endpoint adapter - the upstream seen as "list" and "invoke"
// ABOUTME: primitives plus change and connection-loss events.

use async_trait::async_trait;
use tracing::debug;

use crate::error::McpError;
use crate::mcp::{McpClient, McpToolInfo, TOOLS_LIST_CHANGED, TransportEvent};

/// A tool as the upstream advertises it.
pub type RemoteOperation = McpToolInfo;

/// The upstream operation provider.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Fetch the full catalog, in the order the upstream reports it.
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, McpError>;

    /// Call one operation and return its raw result.
    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;
}

#[async_trait]
impl RemoteEndpoint for McpClient {
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, McpError> {
        self.list_tools().await
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.call_tool(name, arguments).await
    }
}

/// Something the upstream did that the mirror must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEvent {
    /// The upstream's catalog changed; re-list it.
    OperationsChanged,
    /// The upstream connection is gone for good.
    ConnectionLost,
}

impl RemoteEvent {
    /// Map a transport event, dropping notifications the mirror ignores.
    pub fn from_transport(event: TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Closed => Some(RemoteEvent::ConnectionLost),
            TransportEvent::Notification(n) if n.method == TOOLS_LIST_CHANGED => {
                Some(RemoteEvent::OperationsChanged)
            }
            TransportEvent::Notification(n) => {
                debug!(method = %n.method, params = ?n.params, "Upstream notification");
                None
            }
        }
    }
}
