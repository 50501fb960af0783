//! Provider trait for generation endpoints.

use crate::{ApiError, GenerateRequest, StreamEvent};
use futures_core::Stream;
use std::future::Future;
use std::pin::Pin;

/// A boxed async stream of events from a generation provider.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// A generation endpoint that supports function calling.
///
/// Dyn-compatible so the turn loop can hold an `Arc<dyn Provider>` and tests
/// can substitute scripted providers.
pub trait Provider: Send + Sync {
    /// Start a streaming generation for the given conversation.
    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, ApiError>> + Send + 'a>>;

    /// Provider name for logging/display.
    fn name(&self) -> &str;
}
