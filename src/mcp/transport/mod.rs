// ABOUTME: Transport abstraction for MCP communication.
// ABOUTME: Re-exports the stdio transport and the events transports emit.

mod stdio;

pub use stdio::StdioTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{McpNotification, McpRequest, McpResponse};
use crate::error::McpError;

/// Something the peer did that was not a reply to one of our requests.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The peer sent a notification.
    Notification(McpNotification),
    /// The peer's output stream ended or failed.
    Closed,
}

/// Trait for MCP transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and receive a response.
    async fn send(&self, request: McpRequest) -> Result<McpResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(&self, notification: McpNotification) -> Result<(), McpError>;

    /// Take the event stream. Only the first caller gets it.
    async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Shutdown the transport.
    async fn shutdown(&self) -> Result<(), McpError>;
}
