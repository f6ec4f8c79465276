// ABOUTME: Defines all error types for the proxy using thiserror.
// ABOUTME: Each layer has its own error enum, unified under ProxyError.

/// Top-level error type for the proxy runtime.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] McpError),

    #[error("Connection to upstream closed unexpectedly")]
    UpstreamConnectionLost,

    #[error("Initial tool sync failed: {0}")]
    Startup(#[source] SyncError),

    #[error("Local transport error: {0}")]
    Local(#[source] McpError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Process exit code for this failure.
    ///
    /// `2` is reserved for losing an upstream that was already connected, so
    /// callers can tell "never connected" apart from "lost connection".
    pub fn exit_code(&self) -> i32 {
        match self {
            ProxyError::UpstreamConnectionLost => 2,
            _ => 1,
        }
    }
}

/// Errors from MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from local registry transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("Tool '{0}' was never registered")]
    UnknownOperation(String),
}

/// Errors from a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to list upstream tools: {0}")]
    Listing(#[source] McpError),

    #[error("Registry rejected sync pass: {0}")]
    Registry(#[from] RegistryError),
}

/// A caller-supplied `args_json` payload that is not valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid JSON for args_json: {detail}")]
pub struct ArgumentParseError {
    pub detail: String,
}

/// Errors from forwarding a single tool invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    ArgumentParse(#[from] ArgumentParseError),

    #[error("Upstream call failed: {0}")]
    Upstream(#[source] McpError),
}
