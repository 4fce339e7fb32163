//! Durable storage of process records.
//!
//! The supervisor only depends on the [`ProcessStore`] trait. Two
//! implementations ship with the crate:
//! - [`InMemoryProcessStore`] for tests and embedding callers
//! - [`FileProcessStore`], one JSON document per record, which survives
//!   supervisor restarts

mod file;
mod memory;

pub use file::FileProcessStore;
pub use memory::InMemoryProcessStore;

use async_trait::async_trait;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by process store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(Uuid),

    #[error("Record {0} already exists")]
    Duplicate(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Type alias for Result with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD over process records.
///
/// Implementations are independently consistent: the supervisor never
/// wraps several calls in a transaction.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Persist a new record.
    async fn create(&self, record: &ProcessRecord) -> StoreResult<()>;

    /// Look up a record by id. `Ok(None)` when it does not exist.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<ProcessRecord>>;

    /// The running record of a script, if any.
    async fn find_running_by_script_id(
        &self,
        script_id: Uuid,
    ) -> StoreResult<Option<ProcessRecord>>;

    /// All records started by a user, oldest first.
    async fn find_by_user_id(&self, user_id: Uuid) -> StoreResult<Vec<ProcessRecord>>;

    /// All records of a script, oldest first.
    async fn find_by_script_id(&self, script_id: Uuid) -> StoreResult<Vec<ProcessRecord>>;

    /// Replace a stored record with `record`.
    async fn update(&self, record: &ProcessRecord) -> StoreResult<()>;

    /// Record the OS pid of a started run.
    ///
    /// Only applies while the record is `running`; a record already
    /// finalized (possibly by another supervisor) is left untouched.
    async fn set_pid(&self, id: Uuid, pid: u32) -> StoreResult<()>;

    /// Move a record to `status`, stamping `end_time` when the status is
    /// terminal.
    async fn update_status(
        &self,
        id: Uuid,
        status: ProcessStatus,
        exit_code: Option<i32>,
        error: Option<&str>,
    ) -> StoreResult<()>;
}

/// Shared status update applied by both store implementations.
pub(crate) fn apply_status(
    record: &mut ProcessRecord,
    status: ProcessStatus,
    exit_code: Option<i32>,
    error: Option<&str>,
) {
    if status.is_terminal() {
        record.terminate(status, exit_code, error.map(str::to_string));
    } else {
        record.status = status;
    }
}

/// Shared pid update applied by both store implementations. Returns
/// whether the record changed.
pub(crate) fn apply_pid(record: &mut ProcessRecord, pid: u32) -> bool {
    if !record.is_running() {
        return false;
    }
    record.pid = Some(pid);
    true
}

fn sort_by_start(records: &mut [ProcessRecord]) {
    records.sort_by_key(|r| r.start_time);
}
