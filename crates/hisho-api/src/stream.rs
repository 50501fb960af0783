//! Async stream that converts response chunks into typed StreamEvents.

use crate::wire::decode_chunk;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use hisho_types::sse::SseParser;
use hisho_types::{ApiError, StreamEvent, Usage};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

pin_project! {
    /// An async stream of typed [`StreamEvent`]s from `streamGenerateContent`.
    ///
    /// A single network chunk may complete several SSE events, and each event
    /// may carry several parts; everything decoded is queued and yielded in
    /// order. Usage is reported once, after the last chunk.
    pub struct GenerationStream {
        #[pin]
        inner: ByteStream,
        parser: SseParser,
        queued: VecDeque<Result<StreamEvent, ApiError>>,
        usage: Option<Usage>,
        finished: bool,
    }
}

impl GenerationStream {
    /// Wrap a reqwest byte stream.
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self::from_bytes(byte_stream.map(|chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::Network(e.to_string())
                }
            })
        }))
    }

    pub(crate) fn from_bytes(
        byte_stream: impl Stream<Item = Result<Bytes, ApiError>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            queued: VecDeque::new(),
            usage: None,
            finished: false,
        }
    }
}

impl Stream for GenerationStream {
    type Item = Result<StreamEvent, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.queued.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => {
                    for event in this.parser.feed(&bytes) {
                        let data = event.data.trim();
                        if data.is_empty() || data == "[DONE]" {
                            continue;
                        }
                        match decode_chunk(data) {
                            Ok(chunk) => {
                                if chunk.usage.is_some() {
                                    *this.usage = chunk.usage;
                                }
                                this.queued.extend(chunk.events.into_iter().map(Ok));
                            }
                            Err(e) => this.queued.push_back(Err(e)),
                        }
                    }
                }
                Some(Err(e)) => {
                    *this.finished = true;
                    this.queued.push_back(Err(e));
                }
                None => {
                    *this.finished = true;
                    if let Some(usage) = this.usage.take() {
                        this.queued.push_back(Ok(StreamEvent::Usage(usage)));
                    }
                }
            }
        }
    }
}
