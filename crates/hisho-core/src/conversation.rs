//! A conversation: history plus the turn loop that extends it.

use crate::event::{ReplyFragment, ToolActivity, TurnEvent};
use crate::turn::TurnLoop;
use futures_core::Stream;
use hisho_types::{HishoError, Message};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Observer for tool activity during a turn.
pub type ToolActivityHook = Arc<dyn Fn(ToolActivity) + Send + Sync>;

/// One conversation with the secretary. Turns run one at a time.
pub struct Conversation {
    turn_loop: Arc<TurnLoop>,
    history: Arc<Mutex<Vec<Message>>>,
    on_tool_activity: Option<ToolActivityHook>,
}

impl Conversation {
    pub fn new(turn_loop: TurnLoop) -> Self {
        Self {
            turn_loop: Arc::new(turn_loop),
            history: Arc::new(Mutex::new(Vec::new())),
            on_tool_activity: None,
        }
    }

    pub fn on_tool_activity(&mut self, hook: impl Fn(ToolActivity) + Send + Sync + 'static) {
        self.on_tool_activity = Some(Arc::new(hook));
    }

    /// Start a turn for `text` and stream the reply.
    ///
    /// The turn runs on its own task; dropping the returned stream cancels
    /// it. If another turn is still running the stream yields a single
    /// [`HishoError::TurnInProgress`].
    pub fn submit(&self, text: impl Into<String>) -> ReplyStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let Ok(mut history) = Arc::clone(&self.history).try_lock_owned() else {
            let _ = tx.send(Err(HishoError::TurnInProgress));
            return ReplyStream { rx, cancel };
        };

        let turn_loop = Arc::clone(&self.turn_loop);
        let hook = self.on_tool_activity.clone();
        let text = text.into();
        let token = cancel.clone();

        tokio::spawn(async move {
            let fragments = tx.clone();
            let result = turn_loop
                .run(&mut history, &text, token, |event| match event {
                    TurnEvent::TextDelta(delta) => {
                        let _ = fragments.send(Ok(ReplyFragment::Text(delta)));
                    }
                    TurnEvent::ToolStart { name, args, .. } => {
                        if let Some(hook) = &hook {
                            hook(ToolActivity::Started { name, args });
                        }
                    }
                    TurnEvent::ToolEnd { invocation, .. } => {
                        if let Some(hook) = &hook {
                            hook(ToolActivity::Finished(invocation));
                        }
                    }
                    _ => {}
                })
                .await;
            // Release the conversation before the caller sees the end of the reply.
            drop(history);

            let last = result.map(|outcome| ReplyFragment::Finished {
                truncated: outcome.truncated,
                usage: outcome.usage,
            });
            // The receiver is gone if the caller dropped the stream.
            let _ = tx.send(last);
        });

        ReplyStream { rx, cancel }
    }

    /// A snapshot of the history. Waits for a running turn to finish.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Forget the history.
    pub fn clear(&self) -> Result<(), HishoError> {
        let mut history = self
            .history
            .try_lock()
            .map_err(|_| HishoError::TurnInProgress)?;
        history.clear();
        Ok(())
    }

    /// True while a turn is running.
    pub fn is_busy(&self) -> bool {
        self.history.try_lock().is_err()
    }

    pub fn turn_loop(&self) -> &TurnLoop {
        &self.turn_loop
    }
}

/// The streamed reply to one [`Conversation::submit`].
///
/// Yields text fragments as they arrive, then either
/// [`ReplyFragment::Finished`] or an error. Dropping it cancels the turn.
pub struct ReplyStream {
    rx: mpsc::UnboundedReceiver<Result<ReplyFragment, HishoError>>,
    cancel: CancellationToken,
}

impl ReplyStream {
    /// Cancel the turn without dropping the stream; the stream then ends
    /// with [`HishoError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ReplyStream {
    type Item = Result<ReplyFragment, HishoError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
