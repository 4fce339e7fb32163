//! Stopping runs: live runs through their handle, orphaned runs by pid.

use std::sync::Arc;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use tracing::{info, warn};
use uuid::Uuid;

use super::lifecycle::settle;
use crate::access::ScriptAccess;
use crate::error::{SupervisorError, SupervisorResult};
use crate::registry::{LiveHandle, Outcome, Registry, KILLED_EXIT_CODE, STOP_MESSAGE};
use crate::signal::{self, Escalation};
use crate::store::ProcessStore;

/// Terminates runs and records them as `stopped`.
pub struct StopController {
    store: Arc<dyn ProcessStore>,
    access: Arc<dyn ScriptAccess>,
    registry: Arc<Registry>,
}

impl StopController {
    pub fn new(
        store: Arc<dyn ProcessStore>,
        access: Arc<dyn ScriptAccess>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            store,
            access,
            registry,
        }
    }

    /// Stop a run on behalf of `caller`.
    ///
    /// Runs with a live handle take the live path. Runs without one (started
    /// by another or a crashed instance) are signalled by their recorded pid.
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no such record
    /// - `AccessDenied` if the caller neither started the run nor owns its
    ///   script
    /// - `NotRunning` if the run already reached a terminal status
    /// - `SignalFailure` if a live process could be signalled neither
    ///   gracefully nor forcefully; the run is recorded as `stopped` anyway
    pub async fn stop(&self, caller: Uuid, process_id: Uuid) -> SupervisorResult<()> {
        let record = self
            .store
            .find_by_id(process_id)
            .await?
            .ok_or(SupervisorError::NotFound(process_id))?;

        self.authorize(caller, &record).await?;

        if let Some(handle) = self.registry.get(process_id).await {
            return self.stop_live(&handle).await;
        }
        if !record.is_running() {
            return Err(SupervisorError::NotRunning(process_id));
        }
        self.stop_orphan(&record).await
    }

    async fn authorize(&self, caller: Uuid, record: &ProcessRecord) -> SupervisorResult<()> {
        if record.user_id == caller {
            return Ok(());
        }
        match self.access.resolve_script_for_caller(caller, record.script_id).await {
            Ok(script) if script.owner_id == caller => Ok(()),
            _ => Err(SupervisorError::AccessDenied(format!(
                "only the initiator or the script owner may stop process {}",
                record.id
            ))),
        }
    }

    /// Stop a run this instance supervises.
    ///
    /// Claims the `stopped` outcome first; if the run already ended the
    /// claim fails and `NotRunning` is returned.
    pub async fn stop_live(&self, handle: &LiveHandle) -> SupervisorResult<()> {
        if !handle.claim(Outcome::stopped()) {
            return Err(SupervisorError::NotRunning(handle.process_id));
        }

        // Waits for an in-flight start to publish its pid; an unstarted
        // launch is discarded along with its scratch directory.
        drop(handle.take_launch().await);

        let mut failure = None;
        if let Some(pid) = handle.pid() {
            match signal::terminate(pid) {
                Ok(Escalation::Graceful) => {}
                Ok(Escalation::Forced { graceful_error }) => {
                    warn!(
                        process_id = %handle.process_id,
                        pid,
                        error = %graceful_error,
                        "SIGTERM failed, sent SIGKILL"
                    );
                }
                Err(e) if !signal::is_alive(pid) => {
                    info!(process_id = %handle.process_id, pid, error = %e, "process already gone");
                }
                Err(e) => {
                    warn!(
                        process_id = %handle.process_id,
                        pid,
                        error = %e,
                        "failed to signal process"
                    );
                    failure = Some(SupervisorError::SignalFailure {
                        pid,
                        reason: e.to_string(),
                    });
                }
            }
            handle.request_stop();
        }

        settle(&self.registry, self.store.as_ref(), handle).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop a `running` record that has no live handle here.
    ///
    /// Signalling is best-effort; the record is persisted as `stopped`
    /// regardless.
    async fn stop_orphan(&self, record: &ProcessRecord) -> SupervisorResult<()> {
        if let Some(pid) = record.pid {
            match signal::terminate(pid) {
                Ok(escalation) => {
                    info!(process_id = %record.id, pid, ?escalation, "signalled orphaned process")
                }
                Err(e) => warn!(
                    process_id = %record.id,
                    pid,
                    error = %e,
                    "failed to signal orphaned process"
                ),
            }
        }

        self.store
            .update_status(
                record.id,
                ProcessStatus::Stopped,
                Some(KILLED_EXIT_CODE),
                Some(STOP_MESSAGE),
            )
            .await?;

        info!(process_id = %record.id, "orphaned run stopped");
        Ok(())
    }
}
