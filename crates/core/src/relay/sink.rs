//! Destinations for a run's stream events.

use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use sv_protocol::ipc::StreamEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use uuid::Uuid;

/// The caller behind a sink has gone away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("event sink closed")]
pub struct SinkClosed;

/// A transport that delivers stream events to one caller.
///
/// `closed` must resolve once the caller disconnects and must be safe to
/// poll repeatedly; the relay races it against process output.
#[async_trait]
pub trait EventSink: Send + 'static {
    /// Deliver one event.
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed>;

    /// Resolve when the caller has disconnected.
    async fn closed(&mut self);
}

/// Sink backed by a bounded channel, the receiving half of which is handed
/// to the caller as an [`OutputStream`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    /// Create a sink and the stream that receives its events.
    pub fn pair(process_id: Uuid, capacity: usize) -> (Self, OutputStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stream = OutputStream {
            process_id,
            inner: ReceiverStream::new(receiver),
        };
        (Self { sender }, stream)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.sender.send(event).await.map_err(|_| SinkClosed)
    }

    async fn closed(&mut self) {
        self.sender.closed().await;
    }
}

/// Output of one run as an async stream.
///
/// Yields `stdout`/`stderr` events followed by exactly one `end` event.
/// Dropping the stream before the `end` event stops the run.
#[derive(Debug)]
pub struct OutputStream {
    process_id: Uuid,
    inner: ReceiverStream<StreamEvent>,
}

impl OutputStream {
    pub fn process_id(&self) -> Uuid {
        self.process_id
    }
}

impl Stream for OutputStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
