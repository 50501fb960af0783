//! Request/response bodies of the `generateContent` API and their mapping to
//! the canonical conversation types.

use hisho_types::{
    ApiError, ContentBlock, FinishReason, GenerateRequest, Message, Role, StreamEvent,
    ToolDefinition, Usage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    id: String,
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

impl GenerateContentBody {
    pub(crate) fn from_request(request: &GenerateRequest) -> Self {
        let contents = request.messages.iter().map(content_from_message).collect();
        let system_instruction = request.system.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part {
                text: Some(text.clone()),
                ..Part::default()
            }],
        });
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: request.tools.iter().map(declaration).collect(),
            }]
        };
        Self {
            contents,
            system_instruction,
            tools,
            generation_config: request
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        }
    }
}

fn declaration(tool: &ToolDefinition) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.input_schema.clone(),
    }
}

fn content_from_message(message: &Message) -> Content {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => Part {
                text: Some(text.clone()),
                ..Part::default()
            },
            ContentBlock::ToolCall { id, name, args } => Part {
                function_call: Some(FunctionCall {
                    id: Some(id.clone()),
                    name: name.clone(),
                    args: args.clone(),
                }),
                ..Part::default()
            },
            ContentBlock::ToolResult {
                call_id,
                name,
                output,
                is_error,
            } => Part {
                function_response: Some(FunctionResponse {
                    id: call_id.clone(),
                    name: name.clone(),
                    response: response_object(output, *is_error),
                }),
                ..Part::default()
            },
        })
        .collect();
    Content {
        role: Some(role.to_string()),
        parts,
    }
}

/// `functionResponse.response` must be an object.
fn response_object(output: &serde_json::Value, is_error: bool) -> serde_json::Value {
    match output {
        serde_json::Value::Object(_) => output.clone(),
        other if is_error => serde_json::json!({ "error": other }),
        other => serde_json::json!({ "result": other }),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ResponseChunk {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ErrorDetail {
    code: u16,
    message: String,
}

/// Events decoded from one response chunk, plus the running usage it reports.
#[derive(Debug, Default)]
pub(crate) struct DecodedChunk {
    pub events: Vec<StreamEvent>,
    pub usage: Option<Usage>,
}

/// Decode one SSE `data:` payload.
pub(crate) fn decode_chunk(data: &str) -> Result<DecodedChunk, ApiError> {
    let chunk: ResponseChunk = serde_json::from_str(data)
        .map_err(|e| ApiError::StreamParse(format!("invalid response chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ApiError::Server {
            status: error.code,
            message: error.message,
        });
    }

    let mut decoded = DecodedChunk {
        usage: chunk.usage_metadata.map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        }),
        ..DecodedChunk::default()
    };

    // Only the first candidate is used.
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(decoded);
    };

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(call) = part.function_call {
            decoded.events.push(StreamEvent::ToolCall {
                id: call.id.filter(|id| !id.is_empty()).unwrap_or_else(synthetic_call_id),
                name: call.name,
                args: if call.args.is_null() {
                    serde_json::json!({})
                } else {
                    call.args
                },
            });
        } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            decoded.events.push(StreamEvent::TextDelta { text });
        }
    }

    if let Some(reason) = candidate.finish_reason {
        decoded.events.push(StreamEvent::Finish {
            reason: finish_reason(&reason),
        });
    }

    Ok(decoded)
}

/// The endpoint may omit call ids; results must still echo one.
fn synthetic_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::Safety
        }
        other => FinishReason::Other(other.to_string()),
    }
}
