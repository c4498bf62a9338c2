//! # Envelope Stream
//!
//! Async consumption of a topic for code that prefers `await` over
//! callbacks. Backed by a channel fed from an ordinary subscription.

use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::envelope::Envelope;

/// Stream of envelopes for one topic.
///
/// The underlying subscription stays registered after the stream is
/// dropped; later envelopes are discarded at the channel.
pub struct EnvelopeStream {
    topic: String,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl EnvelopeStream {
    pub(crate) fn new(topic: String, receiver: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self { topic, receiver }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next envelope. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EnvelopeStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for EnvelopeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeStream")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
