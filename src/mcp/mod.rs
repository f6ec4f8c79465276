// ABOUTME: MCP module - Model Context Protocol client and server plumbing.
// ABOUTME: Talks to the upstream over stdio and serves the local client over stdio.

mod client;
mod server;
mod transport;
mod types;

pub use client::McpClient;
pub use server::{ARGS_JSON, McpServer, ServerHandle, args_json_schema};
pub use transport::{StdioTransport, Transport, TransportEvent};
pub use types::*;
