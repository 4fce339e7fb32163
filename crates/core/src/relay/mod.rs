//! Stream relay: fan-in of a run's output into one caller sink.
//!
//! Two reader tasks turn the child's stdout and stderr into line events on
//! a bounded channel. A single consumer owns the sink and races three
//! things without priority: the next line, the exit notification and
//! caller disconnect. After exit, already-produced lines are drained
//! before exactly one `end` event is sent.

pub mod reader;
pub mod sink;
pub mod tee;

pub use reader::{spawn_line_reader, Pipe};
pub use sink::{ChannelSink, EventSink, OutputStream, SinkClosed};
pub use tee::{OutputTee, STDERR_PREFIX};

use std::time::Duration;
use sv_protocol::ipc::StreamEvent;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::Outcome;

/// How a relay finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The `end` event was delivered.
    Completed,
    /// The caller went away before the `end` event.
    Disconnected,
}

/// Consumer side of one attached stream.
pub struct Relay<S> {
    process_id: Uuid,
    sink: S,
    chunks: mpsc::Receiver<StreamEvent>,
    exit: oneshot::Receiver<Outcome>,
    tee: Option<OutputTee>,
    drain_timeout: Duration,
}

impl<S: EventSink> Relay<S> {
    pub fn new(
        process_id: Uuid,
        sink: S,
        chunks: mpsc::Receiver<StreamEvent>,
        exit: oneshot::Receiver<Outcome>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            process_id,
            sink,
            chunks,
            exit,
            tee: None,
            drain_timeout,
        }
    }

    /// Copy every forwarded line into `tee`.
    pub fn with_tee(mut self, tee: Option<OutputTee>) -> Self {
        self.tee = tee;
        self
    }

    /// Relay events until the run ends or the caller disconnects.
    pub async fn run(self) -> RelayEnd {
        let Relay {
            process_id,
            mut sink,
            mut chunks,
            mut exit,
            mut tee,
            drain_timeout,
        } = self;

        let mut chunks_open = true;
        let outcome = loop {
            tokio::select! {
                _ = sink.closed() => {
                    debug!(%process_id, "caller disconnected");
                    return RelayEnd::Disconnected;
                }
                chunk = chunks.recv(), if chunks_open => match chunk {
                    Some(event) => {
                        if forward(&mut sink, tee.as_mut(), event).await.is_err() {
                            debug!(%process_id, "caller disconnected mid-send");
                            return RelayEnd::Disconnected;
                        }
                    }
                    None => chunks_open = false,
                },
                outcome = &mut exit => {
                    break outcome.unwrap_or_else(|_| {
                        Outcome::error("process supervision ended unexpectedly")
                    });
                }
            }
        };

        if chunks_open {
            let deadline = tokio::time::sleep(drain_timeout);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        warn!(%process_id, "output still open after exit, dropping the rest");
                        break;
                    }
                    chunk = chunks.recv() => match chunk {
                        Some(event) => {
                            if forward(&mut sink, tee.as_mut(), event).await.is_err() {
                                return RelayEnd::Disconnected;
                            }
                        }
                        None => break,
                    },
                }
            }
        }

        if let Some(tee) = tee.as_mut() {
            tee.finish().await;
        }

        match sink.send(outcome.to_end_event()).await {
            Ok(()) => RelayEnd::Completed,
            Err(SinkClosed) => RelayEnd::Disconnected,
        }
    }
}

async fn forward<S: EventSink>(
    sink: &mut S,
    tee: Option<&mut OutputTee>,
    event: StreamEvent,
) -> Result<(), SinkClosed> {
    if let Some(tee) = tee {
        tee.write(&event).await;
    }
    sink.send(event).await
}
