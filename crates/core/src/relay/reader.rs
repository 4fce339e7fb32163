//! Line readers for a child's output pipes.

use sv_protocol::ipc::StreamEvent;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};
use uuid::Uuid;

/// Which pipe a reader drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipe {
    Stdout,
    Stderr,
}

impl Pipe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipe::Stdout => "stdout",
            Pipe::Stderr => "stderr",
        }
    }

    fn event(&self, text: String) -> StreamEvent {
        match self {
            Pipe::Stdout => StreamEvent::Stdout { text },
            Pipe::Stderr => StreamEvent::Stderr { text },
        }
    }
}

/// Spawn a task emitting one event per line read from `pipe`.
///
/// The task ends at EOF, on a read error (logged), or once the receiving
/// side of `tx` is gone. Invalid UTF-8 is replaced rather than treated as
/// an error.
pub fn spawn_line_reader<R>(
    process_id: Uuid,
    kind: Pipe,
    pipe: R,
    tx: mpsc::Sender<StreamEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                    if tx.send(kind.event(line)).await.is_err() {
                        trace!(%process_id, pipe = kind.as_str(), "relay gone, reader stopping");
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        %process_id,
                        pipe = kind.as_str(),
                        error = %e,
                        "read error, closing pipe"
                    );
                    break;
                }
            }
        }
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
