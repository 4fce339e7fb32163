//! Custom assertion helpers for supervisor tests.

use sv_protocol::ipc::StreamEvent;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};

/// Assert the stream ends with exactly one `end` event and return its
/// `(status, exit_code, error)`.
pub fn assert_single_end(events: &[StreamEvent]) -> (ProcessStatus, Option<i32>, String) {
    let ends = events.iter().filter(|e| e.is_end()).count();
    assert_eq!(ends, 1, "expected exactly one end event, got: {events:?}");

    match events.last() {
        Some(StreamEvent::End {
            status,
            exit_code,
            error,
        }) => (*status, *exit_code, error.clone()),
        other => panic!("last event should be end, got: {other:?}"),
    }
}

/// Text of all stdout events, in order.
#[allow(dead_code)]
pub fn stdout_lines(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Stdout { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Text of all stderr events, in order.
#[allow(dead_code)]
pub fn stderr_lines(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Stderr { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Assert a record reached `status` with its end time stamped.
#[allow(dead_code)]
pub fn assert_terminal(record: &ProcessRecord, status: ProcessStatus) {
    assert_eq!(record.status, status, "unexpected status for {record:?}");
    assert!(record.end_time.is_some(), "terminal record without end_time: {record:?}");
}
