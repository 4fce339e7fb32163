//! In-memory registry of live runs.
//!
//! The registry maps process ids to the [`LiveHandle`] of runs this
//! supervisor started. It is an explicit object shared by `Arc` between
//! the supervisor, the stop controller and the relay tasks. Presence in
//! the registry means the OS process was at least constructed; absence
//! means either the run is terminal or it belongs to another supervisor.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::{Arc, OnceLock};
use sv_protocol::ipc::StreamEvent;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use tokio::sync::{watch, Mutex, MutexGuard, Notify};
use uuid::Uuid;

use crate::launcher::PreparedLaunch;

/// Message persisted for runs terminated by a stop request.
pub const STOP_MESSAGE: &str = "Process stopped by user";

/// Exit code recorded for runs that did not exit on their own.
pub const KILLED_EXIT_CODE: i32 = -1;

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl Outcome {
    /// Outcome of a run terminated by the stop controller.
    pub fn stopped() -> Self {
        Self {
            status: ProcessStatus::Stopped,
            exit_code: Some(KILLED_EXIT_CODE),
            error: Some(STOP_MESSAGE.to_string()),
        }
    }

    /// Outcome of a run the OS could not start or wait on.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::Error,
            exit_code: None,
            error: Some(message.into()),
        }
    }

    /// Classify a completed process.
    ///
    /// Exit code 0 is `success`. A non-zero exit code or death by signal is
    /// `failed`; signal deaths record exit code `-1`.
    pub fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Self {
                status: ProcessStatus::Success,
                exit_code: Some(0),
                error: None,
            },
            Some(code) => Self {
                status: ProcessStatus::Failed,
                exit_code: Some(code),
                error: Some(format!("exit status: {code}")),
            },
            None => Self {
                status: ProcessStatus::Failed,
                exit_code: Some(KILLED_EXIT_CODE),
                error: Some(describe_signal_death(status)),
            },
        }
    }

    /// Terminal outcome stored on `record`, if it is terminal.
    pub fn from_record(record: &ProcessRecord) -> Option<Self> {
        record.status.is_terminal().then(|| Self {
            status: record.status,
            exit_code: record.exit_code,
            error: record.error.clone(),
        })
    }

    /// The `end` event announcing this outcome.
    pub fn to_end_event(&self) -> StreamEvent {
        StreamEvent::End {
            status: self.status,
            exit_code: self.exit_code,
            error: self.error.clone().unwrap_or_default(),
        }
    }
}

#[cfg(unix)]
fn describe_signal_death(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => "terminated without exit code".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal_death(_status: ExitStatus) -> String {
    "terminated without exit code".to_string()
}

/// Shared state of one live run.
///
/// The terminal outcome is claimed exactly once: the first party to call
/// [`LiveHandle::claim`] (exit waiter, start failure or stop controller)
/// performs the terminal transition, everyone else waits on
/// [`LiveHandle::settled`] and observes the winner's outcome.
///
/// The claimed outcome is what this instance observed. The outcome reported
/// to callers is the one the store holds after settling, which differs when
/// another instance finalized the record first.
#[derive(Debug)]
pub struct LiveHandle {
    pub process_id: Uuid,
    pub script_id: Uuid,
    pub user_id: Uuid,
    launch: Mutex<Option<PreparedLaunch>>,
    pid: OnceLock<u32>,
    outcome: OnceLock<Outcome>,
    persisted: OnceLock<Outcome>,
    settled: watch::Sender<bool>,
    stop_requested: Notify,
}

impl LiveHandle {
    pub fn new(process_id: Uuid, script_id: Uuid, user_id: Uuid, launch: PreparedLaunch) -> Self {
        Self {
            process_id,
            script_id,
            user_id,
            launch: Mutex::new(Some(launch)),
            pid: OnceLock::new(),
            outcome: OnceLock::new(),
            persisted: OnceLock::new(),
            settled: watch::Sender::new(false),
            stop_requested: Notify::new(),
        }
    }

    /// Take the unstarted launch. `None` once a stream attached or the run
    /// was stopped before starting.
    pub async fn take_launch(&self) -> Option<PreparedLaunch> {
        self.launch.lock().await.take()
    }

    /// Lock the launch slot. Held by the attaching stream from spawn until
    /// the pid is persisted, so a concurrent stop observes either an
    /// unstarted launch or a started process with a known pid.
    pub(crate) async fn lock_launch(&self) -> MutexGuard<'_, Option<PreparedLaunch>> {
        self.launch.lock().await
    }

    pub fn set_pid(&self, pid: u32) {
        let _ = self.pid.set(pid);
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// Try to become the party performing the terminal transition.
    ///
    /// Returns `true` if `outcome` won.
    pub fn claim(&self, outcome: Outcome) -> bool {
        self.outcome.set(outcome).is_ok()
    }

    /// The claimed outcome, if any.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    /// Mark the terminal transition as fully persisted, recording the
    /// outcome the store ended up holding.
    pub fn mark_settled(&self, persisted: Outcome) {
        let _ = self.persisted.set(persisted);
        self.settled.send_replace(true);
    }

    /// The outcome to report: the persisted one once settled, else the
    /// claimed one.
    pub fn final_outcome(&self) -> Option<&Outcome> {
        self.persisted.get().or_else(|| self.outcome.get())
    }

    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    /// Wait until the terminal transition has been persisted.
    pub async fn settled(&self) {
        let mut rx = self.settled.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Ask the exit waiter to hard-kill after the grace period.
    pub fn request_stop(&self) {
        self.stop_requested.notify_one();
    }

    pub(crate) async fn stop_requested(&self) {
        self.stop_requested.notified().await;
    }
}

/// Live runs keyed by process id.
#[derive(Debug, Default)]
pub struct Registry {
    handles: Mutex<HashMap<Uuid, Arc<LiveHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, handle: Arc<LiveHandle>) {
        self.handles.lock().await.insert(handle.process_id, handle);
    }

    pub async fn get(&self, process_id: Uuid) -> Option<Arc<LiveHandle>> {
        self.handles.lock().await.get(&process_id).cloned()
    }

    pub async fn remove(&self, process_id: Uuid) -> Option<Arc<LiveHandle>> {
        self.handles.lock().await.remove(&process_id)
    }

    pub async fn contains(&self, process_id: Uuid) -> bool {
        self.handles.lock().await.contains_key(&process_id)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.handles.lock().await.keys().copied().collect()
    }
}
