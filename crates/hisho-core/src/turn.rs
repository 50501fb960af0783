//! The bounded loop between the model and the tool router.

use crate::error::outcome_error;
use crate::event::{TurnEvent, TurnOutcome};
use futures_util::StreamExt;
use hisho_tools::{ToolInvocation, ToolRouter};
use hisho_types::provider::Provider;
use hisho_types::{
    ContentBlock, FinishReason, GenerateRequest, HishoError, Message, Role, StreamEvent, Usage,
    validate_tool_pairing,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tool rounds allowed per turn before the loop gives up.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

#[derive(Debug, Clone)]
struct RequestedCall {
    id: String,
    name: String,
    args: serde_json::Value,
}

/// One fully drained model response.
#[derive(Debug, Default)]
struct ModelResponse {
    text: String,
    calls: Vec<RequestedCall>,
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<RequestedCall>),
    Done,
    /// The model still wanted tools after the last allowed round.
    Aborted,
    Failed(HishoError),
}

/// Runs one user turn: generation, tool calls, generation again, until the
/// model answers in plain text or the round limit is hit.
pub struct TurnLoop {
    provider: Arc<dyn Provider>,
    router: Arc<ToolRouter>,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    max_tool_rounds: usize,
}

impl TurnLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        router: Arc<ToolRouter>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            router,
            model: model.into(),
            system_prompt: None,
            temperature: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Some(prompt);
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = Some(temperature);
    }

    pub fn set_max_tool_rounds(&mut self, rounds: usize) {
        self.max_tool_rounds = rounds;
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn for `input`, appending to `history`.
    ///
    /// Tool calls run one at a time in the order the model asked for them.
    /// On return the history never holds a tool call without its result:
    /// unanswered calls are dropped when the round limit is hit or a fatal
    /// error ends the turn, and the whole assistant turn is removed when the
    /// turn is cancelled.
    pub async fn run<F>(
        &self,
        history: &mut Vec<Message>,
        input: &str,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<TurnOutcome, HishoError>
    where
        F: FnMut(TurnEvent),
    {
        history.push(Message::user(input));
        let mut outcome = TurnOutcome::default();
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    match self
                        .generate(history, &cancel, &mut on_event, &mut outcome.usage)
                        .await
                    {
                        Ok(response) => {
                            outcome.text.push_str(&response.text);
                            push_assistant_turn(history, &response);
                            if response.calls.is_empty() {
                                LoopState::Done
                            } else if outcome.tool_rounds >= self.max_tool_rounds {
                                LoopState::Aborted
                            } else {
                                LoopState::ExecutingTools(response.calls)
                            }
                        }
                        Err(e) => LoopState::Failed(e),
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    outcome.tool_rounds += 1;
                    match self
                        .execute_tools(calls, &cancel, &mut on_event, &mut outcome.invocations)
                        .await
                    {
                        Ok(results) => {
                            history.push(Message {
                                role: Role::User,
                                content: results,
                            });
                            LoopState::AwaitingModel
                        }
                        Err(e) => LoopState::Failed(e),
                    }
                }
                LoopState::Done => {
                    on_event(TurnEvent::Usage(outcome.usage.clone()));
                    on_event(TurnEvent::Done);
                    return Ok(outcome);
                }
                LoopState::Aborted => {
                    tracing::warn!(
                        "Model still requesting tools after {} rounds; stopping the turn",
                        outcome.tool_rounds
                    );
                    drop_unanswered_calls(history);
                    outcome.truncated = true;
                    on_event(TurnEvent::Usage(outcome.usage.clone()));
                    on_event(TurnEvent::Truncated {
                        rounds: outcome.tool_rounds,
                    });
                    return Ok(outcome);
                }
                LoopState::Failed(error) => {
                    if matches!(error, HishoError::Cancelled) {
                        remove_unanswered_turn(history);
                        on_event(TurnEvent::Cancelled);
                    } else {
                        tracing::warn!("Turn failed: {error}");
                        drop_unanswered_calls(history);
                    }
                    return Err(error);
                }
            };
        }
    }

    /// Stream one model response to completion.
    async fn generate<F>(
        &self,
        history: &mut Vec<Message>,
        cancel: &CancellationToken,
        on_event: &mut F,
        usage: &mut Usage,
    ) -> Result<ModelResponse, HishoError>
    where
        F: FnMut(TurnEvent),
    {
        validate_tool_pairing(history).map_err(HishoError::Protocol)?;

        let mut request = GenerateRequest {
            model: self.model.clone(),
            messages: std::mem::take(history),
            system: self.system_prompt.clone(),
            tools: self.router.definitions(),
            temperature: self.temperature,
        };

        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.stream_generate(&request) => Some(result),
        };

        // Hand the history back before anything can return early.
        *history = std::mem::take(&mut request.messages);

        let mut stream = match started {
            Some(result) => result?,
            None => return Err(HishoError::Cancelled),
        };

        let mut response = ModelResponse::default();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HishoError::Cancelled),
                event = stream.next() => event,
            };
            match event {
                Some(Ok(StreamEvent::TextDelta { text })) => {
                    on_event(TurnEvent::TextDelta(text.clone()));
                    response.text.push_str(&text);
                }
                Some(Ok(StreamEvent::ToolCall { id, name, args })) => {
                    tracing::debug!("Model requested {name} ({id})");
                    response.calls.push(RequestedCall { id, name, args });
                }
                Some(Ok(StreamEvent::Usage(u))) => usage.add(&u),
                Some(Ok(StreamEvent::Finish { reason })) => {
                    if reason != FinishReason::Stop {
                        tracing::warn!("Generation finished early: {reason:?}");
                    }
                }
                Some(Err(e)) => return Err(HishoError::Api(e)),
                None => break,
            }
        }
        Ok(response)
    }

    /// Run the requested calls in order and build the result blocks.
    ///
    /// Each call runs on its own task. If the turn is cancelled the task is
    /// left to finish and its result is dropped.
    async fn execute_tools<F>(
        &self,
        calls: Vec<RequestedCall>,
        cancel: &CancellationToken,
        on_event: &mut F,
        invocations: &mut Vec<ToolInvocation>,
    ) -> Result<Vec<ContentBlock>, HishoError>
    where
        F: FnMut(TurnEvent),
    {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            on_event(TurnEvent::ToolStart {
                id: call.id.clone(),
                name: call.name.clone(),
                args: call.args.clone(),
            });

            let router = Arc::clone(&self.router);
            let (name, args) = (call.name.clone(), call.args.clone());
            let task = tokio::spawn(async move { router.invoke(&name, args).await });

            let invocation = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Turn cancelled while {} was running", call.name);
                    return Err(HishoError::Cancelled);
                }
                joined = task => joined.map_err(|e| {
                    HishoError::Other(format!("tool task for {} failed: {e}", call.name))
                })?,
            };

            on_event(TurnEvent::ToolEnd {
                id: call.id.clone(),
                invocation: invocation.clone(),
            });
            let fatal = outcome_error(&invocation.outcome);
            let (output, is_error) = invocation.outcome.to_tool_output();
            invocations.push(invocation);
            if let Some(error) = fatal {
                return Err(error);
            }

            results.push(ContentBlock::ToolResult {
                call_id: call.id,
                name: call.name,
                output,
                is_error,
            });
        }
        Ok(results)
    }
}

fn push_assistant_turn(history: &mut Vec<Message>, response: &ModelResponse) {
    let mut content = Vec::with_capacity(response.calls.len() + 1);
    if !response.text.is_empty() {
        content.push(ContentBlock::Text {
            text: response.text.clone(),
        });
    }
    content.extend(response.calls.iter().map(|c| ContentBlock::ToolCall {
        id: c.id.clone(),
        name: c.name.clone(),
        args: c.args.clone(),
    }));
    if !content.is_empty() {
        history.push(Message {
            role: Role::Assistant,
            content,
        });
    }
}

/// Strip unanswered tool calls from the last turn, dropping the turn if
/// nothing else is left in it.
fn drop_unanswered_calls(history: &mut Vec<Message>) {
    let Some(last) = history.last_mut() else {
        return;
    };
    if last.role != Role::Assistant {
        return;
    }
    last.content.retain(|b| !matches!(b, ContentBlock::ToolCall { .. }));
    if last.content.is_empty() {
        history.pop();
    }
}

fn remove_unanswered_turn(history: &mut Vec<Message>) {
    if history
        .last()
        .is_some_and(|m| m.role == Role::Assistant && !m.tool_call_ids().is_empty())
    {
        history.pop();
    }
}
