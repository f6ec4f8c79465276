// ABOUTME: Argument codec - turns the textual args_json payload into the
// ABOUTME: structured arguments an upstream tool call expects.

use crate::error::ArgumentParseError;

/// Decode a raw `args_json` payload.
///
/// Absent or all-whitespace input means "no arguments" and decodes to `{}`.
/// Anything else must be valid JSON and is passed through exactly as parsed.
pub fn decode(raw: Option<&str>) -> Result<serde_json::Value, ArgumentParseError> {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }

    serde_json::from_str(trimmed).map_err(|e| ArgumentParseError {
        detail: e.to_string(),
    })
}
