//! The script execution supervisor.
//!
//! [`Supervisor`] admits runs, hands out their output streams and stops
//! them. Each run moves through
//! `admitted → spawning → running → {success | stopped | failed | error}`:
//!
//! - `run_script` resolves the script, rejects a second concurrent run of
//!   the same script, materializes it and persists a `running` record
//! - attaching a stream starts the OS process and the relay tasks
//! - the first of process exit or a stop request claims the terminal
//!   outcome, removes the run from the registry and persists the outcome
//!
//! The registry only knows runs started by this instance. Records left
//! `running` by another (or a crashed) instance are handled through the
//! orphan path of the stop controller and lazy reconciliation on reads.

mod lifecycle;
mod stop;

pub use stop::StopController;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sv_protocol::config_models::SupervisorConfig;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::ScriptAccess;
use crate::error::{SupervisorError, SupervisorResult};
use crate::launcher::Launcher;
use crate::registry::{LiveHandle, Registry};
use crate::relay::{ChannelSink, OutputStream};
use crate::signal;
use crate::store::ProcessStore;

/// Error recorded for runs whose process vanished while nobody supervised it.
pub const UNSUPERVISED_MESSAGE: &str = "process exited while unsupervised";

/// Runtime knobs derived from [`SupervisorConfig`].
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub channel_capacity: usize,
    pub stop_grace_period: Duration,
    pub drain_timeout: Duration,
    pub output_dir: Option<PathBuf>,
}

impl Settings {
    fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
            stop_grace_period: Duration::from_millis(config.stop_grace_period_ms),
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// Supervises script runs for many callers.
pub struct Supervisor {
    store: Arc<dyn ProcessStore>,
    access: Arc<dyn ScriptAccess>,
    registry: Arc<Registry>,
    launcher: Launcher,
    stop: Arc<StopController>,
    settings: Settings,
}

impl Supervisor {
    /// Create a supervisor.
    ///
    /// # Arguments
    ///
    /// * `config` - Launch strategies, scratch location and stream tuning
    /// * `store` - Durable process records
    /// * `access` - Script resolution and ownership checks
    pub fn new(
        config: &SupervisorConfig,
        store: Arc<dyn ProcessStore>,
        access: Arc<dyn ScriptAccess>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let stop = Arc::new(StopController::new(
            Arc::clone(&store),
            Arc::clone(&access),
            Arc::clone(&registry),
        ));

        Self {
            store,
            access,
            registry,
            launcher: Launcher::new(config),
            stop,
            settings: Settings::from_config(config),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ProcessStore> {
        &self.store
    }

    pub fn stop_controller(&self) -> &Arc<StopController> {
        &self.stop
    }

    /// Admit a new run of `script_id` on behalf of `caller`.
    ///
    /// The returned record is `running` without a pid: the OS process is
    /// started when a stream attaches (see [`Supervisor::stream_output`]).
    ///
    /// # Errors
    ///
    /// - `AccessDenied` if the caller may not run the script
    /// - `AlreadyRunning` if the script has a running record
    /// - `UnsupportedScriptType` / `SpawnFailure` from the launcher; no
    ///   record is persisted in that case
    /// - `Store` if the store cannot be queried or written
    pub async fn run_script(
        &self,
        caller: Uuid,
        script_id: Uuid,
        args: &[String],
    ) -> SupervisorResult<ProcessRecord> {
        let script = self.access.resolve_script_for_caller(caller, script_id).await?;

        // Check-then-insert; two concurrent admissions can both pass.
        if let Some(existing) = self.store.find_running_by_script_id(script_id).await? {
            let existing = self.reconcile(existing).await;
            if existing.is_running() {
                return Err(SupervisorError::AlreadyRunning {
                    script_id,
                    process_id: existing.id,
                });
            }
        }

        let launch = self.launcher.prepare(&script, args).await?;

        let mut record = ProcessRecord::admitted(script_id, caller);
        if let Some(dir) = &self.settings.output_dir {
            let path = dir.join(format!("{}.log", record.id));
            record.output_path = Some(path.to_string_lossy().into_owned());
        }
        self.store.create(&record).await?;

        let handle = LiveHandle::new(record.id, script_id, caller, launch);
        self.registry.put(Arc::new(handle)).await;

        info!(
            process_id = %record.id,
            script_id = %script_id,
            user_id = %caller,
            script_type = %script.script_type,
            "run admitted"
        );
        Ok(record)
    }

    /// Start the run (if not started yet) and return its output stream.
    ///
    /// Failures after this point, including a failed process start, are
    /// reported as the stream's `end` event. Dropping the stream before
    /// the `end` event stops the run.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no such record exists
    /// - `NotRunning` if the run already reached a terminal status
    /// - `StreamUnavailable` if a stream is already attached or the run is
    ///   not supervised by this instance
    pub async fn stream_output(&self, process_id: Uuid) -> SupervisorResult<OutputStream> {
        let (sink, stream) = ChannelSink::pair(process_id, self.settings.channel_capacity);
        // The relay runs detached; its lifetime is bound to the stream.
        drop(self.attach(process_id, sink).await?);
        Ok(stream)
    }

    /// Stop a run on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied`, `NotRunning` or `SignalFailure`; see
    /// [`StopController::stop`].
    pub async fn stop_process(&self, caller: Uuid, process_id: Uuid) -> SupervisorResult<()> {
        self.stop.stop(caller, process_id).await
    }

    /// All runs started by `caller`, oldest first.
    pub async fn list_processes(&self, caller: Uuid) -> SupervisorResult<Vec<ProcessRecord>> {
        let records = self.store.find_by_user_id(caller).await?;
        Ok(self.reconcile_all(records).await)
    }

    /// One run, visible to its initiator and to anyone who may access its
    /// script.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no such record exists
    /// - `AccessDenied` if the caller neither started the run nor may
    ///   access the script
    pub async fn get_process(
        &self,
        caller: Uuid,
        process_id: Uuid,
    ) -> SupervisorResult<ProcessRecord> {
        let record = self
            .store
            .find_by_id(process_id)
            .await?
            .ok_or(SupervisorError::NotFound(process_id))?;

        if record.user_id != caller {
            self.access.resolve_script_for_caller(caller, record.script_id).await?;
        }
        Ok(self.reconcile(record).await)
    }

    /// All runs of a script the caller may access, oldest first.
    pub async fn list_script_processes(
        &self,
        caller: Uuid,
        script_id: Uuid,
    ) -> SupervisorResult<Vec<ProcessRecord>> {
        self.access.resolve_script_for_caller(caller, script_id).await?;
        let records = self.store.find_by_script_id(script_id).await?;
        Ok(self.reconcile_all(records).await)
    }

    async fn reconcile_all(&self, records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
        let mut reconciled = Vec::with_capacity(records.len());
        for record in records {
            reconciled.push(self.reconcile(record).await);
        }
        reconciled
    }

    /// Correct a `running` record whose process died unsupervised.
    ///
    /// Only records without a live handle here and with a recorded pid that
    /// no longer exists are touched. Store failures leave the record as read.
    async fn reconcile(&self, mut record: ProcessRecord) -> ProcessRecord {
        if !record.is_running() || self.registry.contains(record.id).await {
            return record;
        }
        let Some(pid) = record.pid else {
            return record;
        };
        if signal::is_alive(pid) {
            return record;
        }

        match self
            .store
            .update_status(record.id, ProcessStatus::Error, None, Some(UNSUPERVISED_MESSAGE))
            .await
        {
            Ok(()) => {
                warn!(
                    process_id = %record.id,
                    pid,
                    "running record had no live process, marked as error"
                );
                record.terminate(
                    ProcessStatus::Error,
                    None,
                    Some(UNSUPERVISED_MESSAGE.to_string()),
                );
            }
            Err(e) => {
                warn!(
                    process_id = %record.id,
                    pid,
                    error = %e,
                    "failed to reconcile stale running record"
                );
            }
        }
        record
    }
}
