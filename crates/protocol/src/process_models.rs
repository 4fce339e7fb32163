//! Durable process record models.
//!
//! A [`ProcessRecord`] describes one execution attempt of a script. It is
//! created when a run is admitted, updated once when the OS process starts
//! and exactly once more when the run reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle status of a single run.
///
/// `Running` is the only non-terminal status. Every other status is set
/// exactly once, together with the record's `end_time`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Admitted and not yet terminated. The OS process may not have started.
    Running,

    /// Terminated on request (caller stop or stream disconnect).
    Stopped,

    /// Exited on its own with exit code 0.
    Success,

    /// Exited on its own with a non-zero exit code or was killed by a signal.
    Failed,

    /// Could not be started or waited on because of an OS-level error.
    Error,
}

impl ProcessStatus {
    /// Whether this status ends the run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Success => "success",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted representation of one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ProcessRecord {
    /// Unique identifier, assigned at admission and never changed.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Script this run executes.
    #[ts(type = "string")]
    pub script_id: Uuid,

    /// Caller that requested the run.
    #[ts(type = "string")]
    pub user_id: Uuid,

    /// OS process id, set once the process has started.
    ///
    /// Only trusted while `status` is [`ProcessStatus::Running`]; kept for
    /// audit afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    pub status: ProcessStatus,

    pub start_time: DateTime<Utc>,

    /// Set exactly once, when `status` becomes terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Failure detail for abnormal terminations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Where the run's output is persisted, if output persistence is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl ProcessRecord {
    /// Create a freshly admitted record: `running`, no pid, no end time.
    pub fn admitted(script_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            script_id,
            user_id,
            pid: None,
            status: ProcessStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            error: None,
            output_path: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }

    /// Apply a terminal transition in place.
    ///
    /// Records that are already terminal are left untouched so `end_time`
    /// is only ever written once.
    pub fn terminate(
        &mut self,
        status: ProcessStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        if exit_code.is_some() {
            self.exit_code = exit_code;
        }
        if let Some(error) = error.filter(|e| !e.is_empty()) {
            self.error = Some(error);
        }
    }
}
