use hisho_mcp::McpToolResult;

/// Turn a `tools/call` result into a single JSON value.
///
/// Text parts are joined with newlines; if the joined text is JSON it is
/// decoded, otherwise it is returned as a string.
pub fn normalize_content(result: &McpToolResult) -> serde_json::Value {
    let text = result.joined_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return serde_json::Value::String(String::new());
    }
    serde_json::from_str(trimmed).unwrap_or(serde_json::Value::String(text))
}
