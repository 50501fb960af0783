//! Canonical conversation types shared by providers and the turn loop.
//!
//! These are vendor-neutral: a provider translates them to and from its own
//! wire format. The only contract they encode is function calling, where a
//! tool call carries an id that the matching tool result must echo.

use serde::{Deserialize, Serialize};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// A user turn carrying plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenated text of every text block in this turn.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids of the tool calls requested in this turn, in request order.
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids echoed by the tool results in this turn, in order.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// A block of content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        name: String,
        output: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
}

/// A tool declaration offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A streaming generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other(String),
}

/// Token usage reported by the generation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Accumulate usage from another response.
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Events yielded by a provider while a response streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    /// A complete tool request. Providers only emit this once the call's
    /// arguments are fully known.
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    Usage(Usage),
    Finish {
        reason: FinishReason,
    },
}

/// Check that every tool-call turn is immediately answered by a tool-result
/// turn echoing the same ids in the same order.
///
/// The generation endpoint rejects histories that break this pairing, so the
/// turn loop checks it before every request.
pub fn validate_tool_pairing(messages: &[Message]) -> Result<(), String> {
    for (i, message) in messages.iter().enumerate() {
        let calls = message.tool_call_ids();
        let results = message.tool_result_ids();

        if !results.is_empty() {
            let requested = i
                .checked_sub(1)
                .map(|prev| messages[prev].tool_call_ids())
                .unwrap_or_default();
            if requested != results {
                return Err(format!(
                    "tool results at turn {i} echo {results:?} but the previous turn requested {requested:?}"
                ));
            }
        }

        if !calls.is_empty() {
            let answered = messages
                .get(i + 1)
                .map(|next| next.tool_result_ids())
                .unwrap_or_default();
            if answered != calls {
                return Err(format!(
                    "tool calls {calls:?} at turn {i} are not answered by the next turn"
                ));
            }
        }
    }
    Ok(())
}
