// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use rube_proxy::prelude::*;` to get started quickly.

pub use crate::config::ProxyConfig;
pub use crate::error::{
    ArgumentParseError, InvokeError, McpError, ProxyError, RegistryError, SyncError,
};
pub use crate::mcp::{
    McpClient, McpClientInfo, McpServer, McpServerConfig, McpToolInfo, McpTransport,
    ServerHandle, StdioTransport, Transport, TransportEvent,
};
pub use crate::mirror::{
    ChangeNotifier, Describer, Forwarder, RemoteEndpoint, RemoteEvent, RemoteOperation,
    SyncReport, SyncTrigger, Synchronizer, spawn_sync_worker,
};
pub use crate::proxy::{Proxy, connect_upstream, run};
pub use crate::tool::{
    Dispatch, Invoke, Registry, RegistryView, ToolDescriptor, ToolListing, ToolResult,
    ToolState, ToolUpdate,
};
