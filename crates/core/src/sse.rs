//! Server-sent-event framing of stream events.
//!
//! ```text
//! data: hello
//!
//! data: [ERROR] something went wrong
//!
//! event: end
//! data: {"status":"success","exitCode":0,"error":""}
//! ```

use serde::Serialize;
use sv_protocol::ipc::StreamEvent;
use sv_protocol::process_models::ProcessStatus;
use tokio_stream::{Stream, StreamExt};

use crate::relay::STDERR_PREFIX;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndPayload<'a> {
    status: ProcessStatus,
    exit_code: Option<i32>,
    error: &'a str,
}

/// Render one event as an SSE frame, including the blank line terminator.
pub fn encode(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Stdout { text } => format!("data: {text}\n\n"),
        StreamEvent::Stderr { text } => format!("data: {STDERR_PREFIX}{text}\n\n"),
        StreamEvent::End {
            status,
            exit_code,
            error,
        } => {
            let payload = EndPayload {
                status: *status,
                exit_code: *exit_code,
                error,
            };
            // A struct of plain fields always serializes.
            let json = serde_json::to_string(&payload).unwrap_or_default();
            format!("event: end\ndata: {json}\n\n")
        }
    }
}

/// Map an event stream into SSE frames.
pub fn frames<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = StreamEvent> + Unpin,
{
    async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            yield encode(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_output_lines() {
        assert_eq!(encode(&StreamEvent::stdout("hello")), "data: hello\n\n");
        assert_eq!(encode(&StreamEvent::stderr("oops")), "data: [ERROR] oops\n\n");
    }

    #[test]
    fn test_encode_end_event() {
        let frame = encode(&StreamEvent::End {
            status: ProcessStatus::Stopped,
            exit_code: Some(-1),
            error: "Process stopped by user".to_string(),
        });
        assert_eq!(
            frame,
            "event: end\n\
             data: {\"status\":\"stopped\",\"exitCode\":-1,\
             \"error\":\"Process stopped by user\"}\n\n"
        );
    }

    #[test]
    fn test_encode_end_without_exit_code() {
        let frame = encode(&StreamEvent::End {
            status: ProcessStatus::Error,
            exit_code: None,
            error: "spawn failed".to_string(),
        });
        assert!(frame.contains("\"exitCode\":null"));
    }

    #[tokio::test]
    async fn test_frames_preserve_order() {
        let events = tokio_stream::iter(vec![
            StreamEvent::stdout("a"),
            StreamEvent::End {
                status: ProcessStatus::Success,
                exit_code: Some(0),
                error: String::new(),
            },
        ]);
        let frames: Vec<String> = frames(events).collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], "data: a\n\n");
        assert!(frames[1].starts_with("event: end\n"));
    }
}
