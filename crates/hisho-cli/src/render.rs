//! Terminal formatting for tool activity, dashboards and tool listings.

use hisho_core::{Dashboard, ToolActivity};
use hisho_mcp::McpToolInfo;
use hisho_tools::Outcome;
use hisho_types::Usage;

/// One line describing a tool call, shown on stderr while a turn runs.
pub fn tool_activity_line(activity: &ToolActivity) -> String {
    match activity {
        ToolActivity::Started { name, args } => {
            format!("  [tool: {name} {}]", compact_json(args, 80))
        }
        ToolActivity::Finished(invocation) => {
            let name = &invocation.abstract_name;
            let target = invocation.concrete_name.as_deref().unwrap_or("unmapped");
            match &invocation.outcome {
                Outcome::Ok(_) => format!("  [tool {name} -> {target} done]"),
                other => format!("  [tool {name} -> {target} failed: {}]", outcome_summary(other)),
            }
        }
    }
}

/// Short human-readable form of an outcome.
pub fn outcome_summary(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ok(value) => compact_json(value, 200),
        Outcome::ToolError(detail) => detail.clone(),
        Outcome::AuthExpired(_) => "authorization expired".to_string(),
        Outcome::TransportFailed(detail) => format!("server unreachable ({detail})"),
        Outcome::Timeout { timeout_ms } => format!("no response within {timeout_ms}ms"),
    }
}

pub fn dashboard(board: &Dashboard) -> String {
    let mut out = format!("Dashboard for {}\n", board.date.format("%Y-%m-%d (%A)"));
    out.push_str(&section("Events", &board.events));
    out.push_str(&section("Unread mail", &board.unread_mail));
    out
}

fn section(title: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ok(value) => {
            let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("\n{title}:\n{}\n", indent(&body))
        }
        other => format!("\n{title}: unavailable ({})\n", outcome_summary(other)),
    }
}

pub fn tool_list(tools: &[McpToolInfo]) -> String {
    if tools.is_empty() {
        return "The server advertises no tools.".to_string();
    }
    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::from("Server tools:\n");
    for tool in tools {
        let description = tool
            .description
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or("");
        out.push_str(&format!("  {:<width$}  {description}\n", tool.name));
    }
    out
}

pub fn usage(usage: &Usage) -> String {
    format!(
        "Tokens: input {}, output {}",
        usage.input_tokens, usage.output_tokens
    )
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn compact_json(value: &serde_json::Value, max_chars: usize) -> String {
    let text = value.to_string();
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}
