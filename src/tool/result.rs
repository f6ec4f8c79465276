// ABOUTME: Defines the ToolResult type - the tools/call payload the proxy
// ABOUTME: builds itself, as opposed to results forwarded from upstream.

use crate::mcp::{McpContentBlock, McpToolResult};

/// A locally produced tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// The output content.
    pub content: String,

    /// Whether this result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }

    /// Render as an MCP `tools/call` result.
    pub fn into_value(self) -> serde_json::Value {
        let result = McpToolResult {
            content: vec![McpContentBlock::Text { text: self.content }],
            is_error: self.is_error,
        };
        serde_json::to_value(result).unwrap_or_else(|_| serde_json::json!({ "content": [] }))
    }
}
