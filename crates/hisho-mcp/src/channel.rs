//! SSE transport channel: one long-lived event stream for inbound messages,
//! one POST per outbound request, responses matched by correlation id.

use crate::config::McpConfig;
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, raw_response_id};
use crate::transport::{RpcFuture, RpcTransport};
use futures_util::{Stream, StreamExt};
use hisho_auth::CredentialManager;
use hisho_types::sse::SseParser;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Completion = oneshot::Sender<Result<serde_json::Value, McpError>>;

/// An open session: where to POST, and which stream generation announced it.
#[derive(Debug, Clone)]
struct ChannelSession {
    submission_url: Url,
    generation: u64,
}

struct PendingCall {
    method: String,
    completion: Completion,
}

/// State shared between the channel handle and its stream reader task.
#[derive(Default)]
struct ChannelState {
    session: Mutex<Option<ChannelSession>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    /// Bumped on every connect, disconnect and lost stream; a reader only
    /// acts on the channel while its generation is current.
    generation: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelState {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn register(&self, id: u64, method: &str, completion: Completion) -> PendingGuard<'_> {
        lock(&self.pending).insert(
            id,
            PendingCall {
                method: method.to_string(),
                completion,
            },
        );
        PendingGuard { state: self, id }
    }

    /// Register a request against `session`. Fails if the session was torn
    /// down after it was read, since its reject_all has already run.
    fn register_for(
        &self,
        session: &ChannelSession,
        id: u64,
        method: &str,
        completion: Completion,
    ) -> Result<PendingGuard<'_>, McpError> {
        let guard = self.register(id, method, completion);
        if self.current_generation() != session.generation {
            return Err(McpError::Closed);
        }
        Ok(guard)
    }

    fn dispatch_raw(&self, data: &str) {
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(value) => self.dispatch_value(value),
            Err(e) => tracing::warn!("Dropping malformed message on tool stream: {e}"),
        }
    }

    /// A response with a usable id settles its request even when the rest
    /// of it is malformed.
    fn dispatch_value(&self, value: serde_json::Value) {
        let id = raw_response_id(&value);
        let error = match serde_json::from_value::<JsonRpcMessage>(value) {
            Ok(message) => return self.dispatch(message),
            Err(e) => e,
        };
        let Some(id) = id else {
            tracing::warn!("Dropping malformed message on tool stream: {error}");
            return;
        };
        let Some(call) = lock(&self.pending).remove(&id) else {
            tracing::debug!("No pending request with id {id}; dropping malformed response");
            return;
        };
        tracing::warn!("Malformed response to {} (id {id}): {error}", call.method);
        let _ = call.completion.send(Err(McpError::Protocol(format!(
            "malformed response to {}: {error}",
            call.method
        ))));
    }

    fn dispatch(&self, message: JsonRpcMessage) {
        let Some(id) = message.response_id() else {
            tracing::debug!(
                "Ignoring server-initiated message: {}",
                message.method.as_deref().unwrap_or("<no method>")
            );
            return;
        };
        let Some(call) = lock(&self.pending).remove(&id) else {
            tracing::debug!("No pending request with id {id}; dropping response");
            return;
        };
        tracing::debug!("<- {} (id {id})", call.method);
        let _ = call.completion.send(message.into_result());
    }

    /// Fail every pending request. Returns how many were rejected.
    fn reject_all(&self, error: impl Fn() -> McpError) -> usize {
        let drained: Vec<PendingCall> = lock(&self.pending).drain().map(|(_, c)| c).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.completion.send(Err(error()));
        }
        count
    }

    fn install_session(&self, generation: u64, submission_url: Url) -> bool {
        if self.current_generation() != generation {
            return false;
        }
        *lock(&self.session) = Some(ChannelSession {
            submission_url,
            generation,
        });
        true
    }

    /// The stream for `generation` is gone. Only touches the channel if that
    /// stream is still the current one.
    fn stream_lost(&self, generation: u64, reason: &str) {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        {
            let mut session = lock(&self.session);
            if session.as_ref().is_some_and(|s| s.generation == generation) {
                *session = None;
            }
        }
        let rejected = self.reject_all(|| McpError::Stream(reason.to_string()));
        if rejected > 0 {
            tracing::warn!("Rejected {rejected} pending tool requests: {reason}");
        }
    }
}

/// Removes a pending entry when its request finishes or is abandoned.
struct PendingGuard<'a> {
    state: &'a ChannelState,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.state.pending).remove(&self.id);
    }
}

/// Reads the event stream until it ends, feeding the channel state.
async fn read_events<S, B, E>(
    state: Arc<ChannelState>,
    stream: S,
    generation: u64,
    base_url: Url,
    announced: oneshot::Sender<Result<Url, McpError>>,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = Box::pin(stream);
    let mut parser = SseParser::new();
    let mut announced = Some(announced);

    let reason = loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                for event in parser.feed(chunk.as_ref()) {
                    match event.event_type.as_deref() {
                        Some("endpoint") => {
                            let resolved = base_url.join(event.data.trim()).map_err(|e| {
                                McpError::Protocol(format!(
                                    "invalid endpoint '{}': {e}",
                                    event.data.trim()
                                ))
                            });
                            match (resolved, announced.take()) {
                                (Ok(url), tx) => {
                                    let installed = state.install_session(generation, url.clone());
                                    match tx {
                                        Some(tx) => {
                                            let _ = tx.send(Ok(url));
                                        }
                                        None if installed => {
                                            tracing::info!("Submission endpoint moved to {url}")
                                        }
                                        None => {}
                                    }
                                }
                                (Err(e), Some(tx)) => {
                                    let _ = tx.send(Err(e));
                                }
                                (Err(e), None) => tracing::warn!("Ignoring endpoint event: {e}"),
                            }
                        }
                        None | Some("message") => state.dispatch_raw(&event.data),
                        Some(other) => tracing::debug!("Ignoring '{other}' event on tool stream"),
                    }
                }
            }
            Some(Err(e)) => break e.to_string(),
            None => break "event stream ended".to_string(),
        }
    };

    tracing::warn!("Tool event stream closed: {reason}");
    state.stream_lost(generation, &reason);
}

/// A JSON-RPC channel to an SSE tool server.
///
/// `connect` opens the event stream and waits for the server to announce its
/// submission URL. Requests may then be issued concurrently; each one gets a
/// fresh correlation id and resolves exactly once. The channel never
/// reconnects on its own.
pub struct SseChannel {
    config: McpConfig,
    http: reqwest::Client,
    credentials: CredentialManager,
    state: Arc<ChannelState>,
    connect_gate: tokio::sync::Mutex<()>,
}

impl SseChannel {
    pub fn new(config: McpConfig, credentials: CredentialManager) -> Self {
        Self::with_http_client(config, credentials, reqwest::Client::new())
    }

    pub fn with_http_client(
        config: McpConfig,
        credentials: CredentialManager,
        http: reqwest::Client,
    ) -> Self {
        let state = ChannelState {
            next_id: AtomicU64::new(1),
            ..ChannelState::default()
        };
        Self {
            config,
            http,
            credentials,
            state: Arc::new(state),
            connect_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the event stream and wait for the endpoint announcement.
    ///
    /// Concurrent calls share one attempt. Returns immediately if already
    /// connected.
    pub async fn connect(&self) -> Result<(), McpError> {
        let _gate = self.connect_gate.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.abort_reader();

        let token = self.credentials.get_valid_token().await?;
        let announce_url = self.announce_url(&token)?;
        let base_url = Url::parse(&self.config.announce_url)
            .map_err(|e| McpError::Protocol(format!("invalid announce URL: {e}")))?;

        tracing::info!("Opening tool event stream at {base_url}");
        let response = self
            .http
            .get(announce_url)
            .header(ACCEPT, "text/event-stream")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| McpError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if matches!(status.as_u16(), 401 | 403) {
                self.credentials.invalidate().await;
            }
            return Err(McpError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (announced_tx, announced_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            Arc::clone(&self.state),
            response.bytes_stream(),
            generation,
            base_url,
            announced_tx,
        ));
        *lock(&self.state.reader) = Some(reader);

        let timeout_ms = self.config.handshake_timeout_ms;
        let outcome =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), announced_rx).await {
                Ok(Ok(Ok(url))) => {
                    tracing::info!("Tool channel ready; submitting to {url}");
                    return Ok(());
                }
                Ok(Ok(Err(e))) => e,
                Ok(Err(_)) => {
                    McpError::Stream("event stream ended before the endpoint announcement".into())
                }
                Err(_) => McpError::HandshakeTimeout { timeout_ms },
            };

        tracing::warn!("Tool channel handshake failed: {outcome}");
        self.discard(generation);
        Err(outcome)
    }

    /// Close the stream and reject every pending request with `Closed`.
    /// Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        self.abort_reader();
        let was_open = lock(&self.state.session).take().is_some();
        let rejected = self.state.reject_all(|| McpError::Closed);
        if was_open || rejected > 0 {
            tracing::info!("Tool channel disconnected ({rejected} pending requests rejected)");
        }
    }

    /// Tear down and open a fresh session.
    pub async fn reconnect(&self) -> Result<(), McpError> {
        self.disconnect();
        self.connect().await
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.state.session).is_some()
    }

    /// The announced submission URL, if connected.
    pub fn submission_url(&self) -> Option<Url> {
        lock(&self.state.session)
            .as_ref()
            .map(|s| s.submission_url.clone())
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.state.pending).len()
    }

    /// Send a request and wait for the response with the same id.
    pub async fn send(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let session = lock(&self.state.session).clone().ok_or(McpError::NotReady)?;

        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let _guard = self.state.register_for(&session, id, method, tx)?;

        let body = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))?;
        tracing::debug!("-> {method} (id {id})");

        let timeout_ms = self.config.call_timeout_ms;
        let exchange = async {
            if let Some(inline) = self.post(&session.submission_url, body).await? {
                self.state.dispatch_value(inline);
            }
            rx.await.map_err(|_| McpError::Closed)?
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{method} (id {id}) timed out after {timeout_ms}ms");
                Err(McpError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// Send a notification (no id, nothing to wait for).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let url = self.submission_url().ok_or(McpError::NotReady)?;
        let body = serde_json::to_vec(&JsonRpcNotification::new(method, params))?;
        tracing::debug!("-> {method} (notification)");
        let timeout_ms = self.config.call_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.post(&url, body)).await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                timeout_ms,
            }),
        }
    }

    /// POST a JSON-RPC body. Servers normally answer 202 and respond on the
    /// stream; a JSON-RPC response in the POST body is returned instead.
    async fn post(&self, url: &Url, body: Vec<u8>) -> Result<Option<serde_json::Value>, McpError> {
        let body = &body;
        self.credentials
            .with_valid_token(|token| async move {
                let response = self
                    .http
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .bearer_auth(&token)
                    .body(body.clone())
                    .send()
                    .await
                    .map_err(|e| McpError::Network(e.to_string()))?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| McpError::Network(e.to_string()))?;
                if !status.is_success() {
                    return Err(McpError::Http {
                        status: status.as_u16(),
                        message: text,
                    });
                }
                Ok(parse_inline_response(&text))
            })
            .await
    }

    fn announce_url(&self, token: &str) -> Result<Url, McpError> {
        let mut url = Url::parse(&self.config.announce_url)
            .map_err(|e| McpError::Protocol(format!("invalid announce URL: {e}")))?;
        if self.config.token_in_query {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    fn abort_reader(&self) {
        if let Some(reader) = lock(&self.state.reader).take() {
            reader.abort();
        }
    }

    /// Drop a failed connection attempt.
    fn discard(&self, generation: u64) {
        self.abort_reader();
        let mut session = lock(&self.state.session);
        if session.as_ref().is_some_and(|s| s.generation == generation) {
            *session = None;
        }
    }
}

impl Drop for SseChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl RpcTransport for SseChannel {
    fn send<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> RpcFuture<'a, serde_json::Value> {
        Box::pin(SseChannel::send(self, method, params))
    }

    fn notify<'a>(
        &'a self,
        method: &'a str,
        params: Option<serde_json::Value>,
    ) -> RpcFuture<'a, ()> {
        Box::pin(SseChannel::notify(self, method, params))
    }
}

fn parse_inline_response(text: &str) -> Option<serde_json::Value> {
    let text = text.trim();
    if !text.starts_with('{') {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(|v| raw_response_id(v).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn state() -> Arc<ChannelState> {
        Arc::new(ChannelState::default())
    }

    fn base() -> Url {
        Url::parse("https://tools.example.com/sse?token=abc").unwrap()
    }

    type Chunks = stream::Iter<std::vec::IntoIter<Result<Vec<u8>, String>>>;

    fn chunks(parts: &[&str]) -> Chunks {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn endpoint_event_installs_resolved_session() {
        let state = state();
        let (tx, rx) = oneshot::channel();
        read_events(
            Arc::clone(&state),
            chunks(&["event: endpoint\ndata: /messages?sessionId=42\n\n"]),
            0,
            base(),
            tx,
        )
        .await;

        let url = rx.await.unwrap().unwrap();
        assert_eq!(url.as_str(), "https://tools.example.com/messages?sessionId=42");
        // Stream ended afterwards, so the session is gone again.
        assert!(lock(&state.session).is_none());
    }

    #[tokio::test]
    async fn responses_resolve_matching_pending_entries() {
        let state = state();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let g1 = state.register(1, "tools/list", tx1);
        let g2 = state.register(2, "tools/call", tx2);
        std::mem::forget(g1);
        std::mem::forget(g2);

        state.dispatch_raw(r#"{"jsonrpc":"2.0","id":2,"result":"second"}"#);
        state.dispatch_raw("not json at all");
        state.dispatch_raw(r#"{"jsonrpc":"2.0","id":99,"result":"stray"}"#);
        state.dispatch_raw(r#"{"jsonrpc":"2.0","id":1,"result":"first"}"#);

        assert_eq!(rx1.await.unwrap().unwrap(), "first");
        assert_eq!(rx2.await.unwrap().unwrap(), "second");
        assert!(lock(&state.pending).is_empty());
    }

    #[tokio::test]
    async fn guard_drop_removes_pending_entry() {
        let state = state();
        let (tx, _rx) = oneshot::channel();
        {
            let _guard = state.register(7, "tools/call", tx);
            assert_eq!(lock(&state.pending).len(), 1);
        }
        assert!(lock(&state.pending).is_empty());
    }

    #[tokio::test]
    async fn stream_end_rejects_pending_and_clears_session() {
        let state = state();
        let (pending_tx, pending_rx) = oneshot::channel();
        std::mem::forget(state.register(1, "tools/call", pending_tx));

        let (tx, _rx) = oneshot::channel();
        read_events(
            Arc::clone(&state),
            chunks(&["event: endpoint\ndata: /messages\n\n", ": keepalive\n\n"]),
            0,
            base(),
            tx,
        )
        .await;

        assert!(matches!(pending_rx.await.unwrap(), Err(McpError::Stream(_))));
        assert!(lock(&state.session).is_none());
    }

    #[tokio::test]
    async fn stale_reader_does_not_touch_newer_session() {
        let state = state();
        state.generation.store(2, Ordering::SeqCst);
        assert!(state.install_session(2, Url::parse("https://new.example/msg").unwrap()));

        let (pending_tx, mut pending_rx) = oneshot::channel();
        std::mem::forget(state.register(5, "tools/call", pending_tx));

        // Reader for generation 1 ends.
        state.stream_lost(1, "old stream closed");

        assert!(lock(&state.session).is_some());
        assert!(pending_rx.try_recv().is_err());
        assert_eq!(lock(&state.pending).len(), 1);
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_the_handshake() {
        let state = state();
        let (tx, rx) = oneshot::channel();
        read_events(
            Arc::clone(&state),
            chunks(&["event: endpoint\ndata: http://[::bad\n\n"]),
            0,
            base(),
            tx,
        )
        .await;
        assert!(matches!(rx.await.unwrap(), Err(McpError::Protocol(_))));
    }

    #[test]
    fn inline_response_detection() {
        assert!(parse_inline_response("").is_none());
        assert!(parse_inline_response("Accepted").is_none());
        assert!(parse_inline_response(r#"{"jsonrpc":"2.0","method":"x"}"#).is_none());
        let msg = parse_inline_response(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert_eq!(raw_response_id(&msg), Some(3));
    }

    #[tokio::test]
    async fn malformed_response_with_known_id_fails_that_request() {
        let state = state();
        let (tx, rx) = oneshot::channel();
        std::mem::forget(state.register(3, "tools/call", tx));

        state.dispatch_raw(r#"{"jsonrpc":"2.0","id":3,"error":{"message":"Unauthorized"}}"#);

        assert!(matches!(rx.await.unwrap(), Err(McpError::Protocol(_))));
        assert!(lock(&state.pending).is_empty());
    }

    #[tokio::test]
    async fn malformed_inline_response_fails_that_request() {
        let state = state();
        let (tx, rx) = oneshot::channel();
        std::mem::forget(state.register(4, "tools/call", tx));

        let inline = parse_inline_response(r#"{"jsonrpc":"2.0","id":4,"error":"denied"}"#).unwrap();
        state.dispatch_value(inline);

        assert!(matches!(rx.await.unwrap(), Err(McpError::Protocol(_))));
    }

    #[test]
    fn request_registered_after_stream_loss_is_refused() {
        let state = state();
        state.generation.store(1, Ordering::SeqCst);
        assert!(state.install_session(1, Url::parse("https://tools.example/msg").unwrap()));
        let session = lock(&state.session).clone().unwrap();

        state.stream_lost(1, "event stream ended");

        let (tx, _rx) = oneshot::channel();
        let registered = state.register_for(&session, 9, "tools/call", tx);
        assert!(matches!(registered, Err(McpError::Closed)));
        assert!(lock(&state.session).is_none());
        assert!(lock(&state.pending).is_empty());
    }

    #[test]
    fn request_registered_on_live_session_is_kept() {
        let state = state();
        state.generation.store(1, Ordering::SeqCst);
        assert!(state.install_session(1, Url::parse("https://tools.example/msg").unwrap()));
        let session = lock(&state.session).clone().unwrap();

        let (tx, _rx) = oneshot::channel();
        let guard = state.register_for(&session, 10, "tools/call", tx).unwrap();
        assert_eq!(lock(&state.pending).len(), 1);
        drop(guard);
        assert!(lock(&state.pending).is_empty());
    }
}
