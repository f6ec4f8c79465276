// ABOUTME: Defines the Invoke trait - the callback bound to each mirrored tool.
// ABOUTME: The local server dispatches tools/call through it without reflection.

use async_trait::async_trait;

use crate::error::InvokeError;

/// The invocation capability bound to a registered tool.
#[async_trait]
pub trait Invoke: Send + Sync {
    /// Run the tool with its raw `args_json` payload and return the result
    /// JSON to hand back to the local caller.
    async fn invoke(&self, raw_args: Option<&str>) -> Result<serde_json::Value, InvokeError>;
}
