//! Response body observation.
//!
//! # Responsibilities
//! - Pass every body frame through to the client unchanged
//! - Keep a bounded copy of the bytes for logging
//! - Report completion exactly once, even when the client disconnects
//!
//! # Design Decisions
//! - Streaming responses are not buffered; only the copy is bounded
//! - Completion is reported on end of stream, on error, or on drop

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};

/// What an [`ObservedBody`] saw by the time it completed.
#[derive(Debug, Clone, Default)]
pub struct CapturedBody {
    /// Captured prefix of the body, at most the configured limit.
    pub bytes: Bytes,
    /// Total number of data bytes that passed through.
    pub total_len: usize,
}

impl CapturedBody {
    /// Whether the body was longer than what was kept.
    pub fn is_truncated(&self) -> bool {
        self.total_len > self.bytes.len()
    }
}

type OnComplete = Box<dyn FnOnce(CapturedBody) + Send>;

/// Body wrapper that copies data frames as they stream to the client.
pub struct ObservedBody {
    inner: Body,
    captured: BytesMut,
    total_len: usize,
    limit: usize,
    on_complete: Option<OnComplete>,
}

impl ObservedBody {
    /// Wrap `inner`, keeping at most `limit` bytes and calling `on_complete` once.
    pub fn new<F>(inner: Body, limit: usize, on_complete: F) -> Self
    where
        F: FnOnce(CapturedBody) + Send + 'static,
    {
        Self {
            inner,
            captured: BytesMut::new(),
            total_len: 0,
            limit,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn capture(&mut self, data: &Bytes) {
        self.total_len += data.len();
        let room = self.limit.saturating_sub(self.captured.len());
        let take = room.min(data.len());
        self.captured.extend_from_slice(&data[..take]);
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            let captured = CapturedBody {
                bytes: std::mem::take(&mut self.captured).freeze(),
                total_len: self.total_len,
            };
            on_complete(captured);
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.capture(data);
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.complete(),
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        self.complete();
    }
}
