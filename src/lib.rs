// ABOUTME: Root module for rube-proxy - mirrors an upstream MCP server's tools
// ABOUTME: behind a local stdio MCP endpoint. Re-exports the public surface.

pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod mirror;
pub mod prelude;
pub mod proxy;
pub mod tool;

pub use error::ProxyError;
