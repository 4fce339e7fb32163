//! Error types surfaced by the supervisor.

use sv_protocol::ipc::{ErrorBody, ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors returned synchronously by supervisor operations.
///
/// Failures that happen after a run has started are not errors: they are
/// reported through the run's terminal stream event and record.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Script {script_id} is already running as process {process_id}; stop it first")]
    AlreadyRunning { script_id: Uuid, process_id: Uuid },

    #[error("Unsupported script type: {0}")]
    UnsupportedScriptType(String),

    #[error("Failed to spawn script: {0}")]
    SpawnFailure(String),

    #[error("Process {0} not found")]
    NotFound(Uuid),

    #[error("Process {0} is not running")]
    NotRunning(Uuid),

    #[error("Cannot stream output of process {process_id}: {reason}")]
    StreamUnavailable { process_id: Uuid, reason: String },

    #[error("Failed to stop process {pid}: {reason}")]
    SignalFailure { pid: u32, reason: String },

    #[error("Process store error: {0}")]
    Store(#[from] StoreError),
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::AccessDenied(_) => ErrorKind::AccessDenied,
            SupervisorError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            SupervisorError::UnsupportedScriptType(_) => ErrorKind::UnsupportedScriptType,
            SupervisorError::SpawnFailure(_) => ErrorKind::SpawnFailure,
            SupervisorError::NotFound(_) => ErrorKind::NotFound,
            SupervisorError::NotRunning(_) => ErrorKind::NotRunning,
            SupervisorError::StreamUnavailable { .. } => ErrorKind::StreamUnavailable,
            SupervisorError::SignalFailure { .. } => ErrorKind::SignalFailure,
            SupervisorError::Store(_) => ErrorKind::Store,
        }
    }

    /// Structured form for callers.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Type alias for Result with SupervisorError.
pub type SupervisorResult<T> = Result<T, SupervisorError>;
