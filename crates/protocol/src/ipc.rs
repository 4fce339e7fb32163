//! Messages sent from the supervisor to callers.
//!
//! A caller attached to a run receives a sequence of [`StreamEvent`]s:
//! any number of `stdout`/`stderr` chunks followed by exactly one `end`
//! event. Synchronous failures are reported as an [`ErrorBody`] carrying a
//! stable [`ErrorKind`].
//!
//! Stream events use internally tagged serialization:
//! ```json
//! { "kind": "stdout", "text": "hello" }
//! { "kind": "end", "status": "success", "exitCode": 0, "error": "" }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::process_models::ProcessStatus;

/// One event on a run's output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    /// One line read from the process's standard output.
    Stdout { text: String },

    /// One line read from the process's standard error.
    Stderr { text: String },

    /// Terminal event. Always the last event of a stream.
    ///
    /// Sent only after the record has reached its terminal status.
    End {
        status: ProcessStatus,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        /// Failure detail, empty for successful runs.
        error: String,
    },
}

impl StreamEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        StreamEvent::Stdout { text: text.into() }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        StreamEvent::Stderr { text: text.into() }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::End { .. })
    }
}

/// Stable classification of supervisor failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller may not run, view or stop this script or run.
    AccessDenied,
    /// Another run of the same script is still running.
    AlreadyRunning,
    /// The declared script type has no launch strategy.
    UnsupportedScriptType,
    /// Preparing or starting the OS process failed.
    SpawnFailure,
    /// No run with the given id exists.
    NotFound,
    /// The run already reached a terminal status.
    NotRunning,
    /// The run is running but its output cannot be attached here.
    StreamUnavailable,
    /// Neither graceful nor forceful termination could be delivered.
    SignalFailure,
    /// The process store failed.
    Store,
}

/// Structured error returned to callers of synchronous operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}
