// ABOUTME: Builds the description a mirrored tool advertises locally: remote
// ABOUTME: title and text, a usage note, and a size-capped schema preview.

use crate::mcp::McpToolInfo;

/// Default character budget for the schema preview.
pub const DEFAULT_SCHEMA_PREVIEW_LIMIT: usize = 6000;

/// Appended to a schema preview that hit the budget.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Preview text when the remote tool has no usable schema.
pub const NO_SCHEMA_NOTE: &str = "Remote tool reports no input schema (arguments optional).";

const ARGS_NOTE: &str =
    "Proxy for an upstream tool. Provide JSON arguments in `args_json`. Leave blank for `{}`.";
const SCHEMA_HEADING: &str = "Original input schema (truncated if large):";

/// Derives local descriptions. Output depends only on the remote descriptor
/// and the preview budget.
#[derive(Debug, Clone, Copy)]
pub struct Describer {
    schema_preview_limit: usize,
}

impl Default for Describer {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_PREVIEW_LIMIT)
    }
}

impl Describer {
    pub fn new(schema_preview_limit: usize) -> Self {
        Self {
            schema_preview_limit,
        }
    }

    /// Full local description for a remote tool.
    pub fn describe(&self, tool: &McpToolInfo) -> String {
        let mut lines = Vec::new();

        if let Some(title) = tool.title.as_deref().filter(|t| *t != tool.name) {
            lines.push(format!("Remote title: {}", title));
        }
        if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(description.trim().to_string());
        }
        lines.push("---".to_string());
        lines.push(ARGS_NOTE.to_string());
        lines.push(SCHEMA_HEADING.to_string());
        lines.push(self.summarise_schema(tool.input_schema.as_ref()));

        lines.join("\n")
    }

    /// Pretty-printed schema, cut to the preview budget in characters.
    pub fn summarise_schema(&self, schema: Option<&serde_json::Value>) -> String {
        let Some(text) = schema.and_then(|s| serde_json::to_string_pretty(s).ok()) else {
            return NO_SCHEMA_NOTE.to_string();
        };

        match text.char_indices().nth(self.schema_preview_limit) {
            None => text,
            Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        }
    }
}
