//! Scripted provider and tool server shared by the turn loop tests.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use hisho_core::TurnLoop;
use hisho_mcp::{McpClient, McpError, RpcFuture, RpcTransport};
use hisho_tools::{ProcedureNames, ToolRouter};
use hisho_types::provider::{EventStream, Provider};
use hisho_types::{ApiError, FinishReason, GenerateRequest, StreamEvent, Usage};
use serde_json::{Value, json};

/// Events for one generation call, each preceded by an optional delay.
pub type Round = Vec<(StreamEvent, Option<u64>)>;

type Script = Box<dyn Fn(usize) -> Round + Send + Sync>;

/// A provider whose n-th generation call streams `script(n)`.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(usize) -> Round + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Plays `rounds` in order; further calls get an empty response.
    pub fn rounds(rounds: Vec<Round>) -> Arc<Self> {
        Self::new(move |n| rounds.get(n).cloned().unwrap_or_default())
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Provider for ScriptedProvider {
    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let events = (self.script)(index);
        Box::pin(async move {
            let stream = stream::unfold(events.into_iter(), |mut iter| async move {
                let (event, delay_ms) = iter.next()?;
                if let Some(ms) = delay_ms {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                Some((Ok(event), iter))
            });
            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn text(t: &str) -> (StreamEvent, Option<u64>) {
    (StreamEvent::TextDelta { text: t.into() }, None)
}

pub fn tool_call(id: &str, name: &str, args: Value) -> (StreamEvent, Option<u64>) {
    (
        StreamEvent::ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        },
        None,
    )
}

pub fn finish() -> (StreamEvent, Option<u64>) {
    (
        StreamEvent::Finish {
            reason: FinishReason::Stop,
        },
        None,
    )
}

pub fn usage(input: u64, output: u64) -> (StreamEvent, Option<u64>) {
    (
        StreamEvent::Usage(Usage {
            input_tokens: input,
            output_tokens: output,
        }),
        None,
    )
}

pub fn delayed(event: (StreamEvent, Option<u64>), ms: u64) -> (StreamEvent, Option<u64>) {
    (event.0, Some(ms))
}

type Answer = Box<dyn Fn(&str, &Value) -> Result<Value, McpError> + Send + Sync>;

/// A tool server answering `tools/call` by procedure name.
pub struct FakeToolServer {
    answer: Answer,
    delay: Duration,
    started: Mutex<Vec<(String, Value)>>,
    completed: AtomicUsize,
}

impl FakeToolServer {
    pub fn new(
        answer: impl Fn(&str, &Value) -> Result<Value, McpError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, answer)
    }

    pub fn with_delay(
        delay: Duration,
        answer: impl Fn(&str, &Value) -> Result<Value, McpError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            answer: Box::new(answer),
            delay,
            started: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        })
    }

    /// Procedure names and arguments, in the order the calls arrived.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl RpcTransport for FakeToolServer {
    fn send<'a>(&'a self, method: &'a str, params: Option<Value>) -> RpcFuture<'a, Value> {
        Box::pin(async move {
            assert_eq!(method, "tools/call");
            let params = params.unwrap_or_default();
            let name = params["name"].as_str().unwrap_or_default().to_string();
            let arguments = params["arguments"].clone();
            self.started
                .lock()
                .unwrap()
                .push((name.clone(), arguments.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = (self.answer)(&name, &arguments);
            self.completed.fetch_add(1, Ordering::SeqCst);
            result
        })
    }

    fn notify<'a>(&'a self, _method: &'a str, _params: Option<Value>) -> RpcFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// A `tools/call` result carrying one text part.
pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

pub fn make_loop(provider: Arc<ScriptedProvider>, server: Arc<FakeToolServer>) -> TurnLoop {
    let transport: Arc<dyn RpcTransport> = server;
    let router = ToolRouter::with_procedure_names(
        Arc::new(McpClient::new(transport)),
        ProcedureNames::default(),
    );
    TurnLoop::new(provider, Arc::new(router), "test-model")
}
