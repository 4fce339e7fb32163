//! Starting attached runs and their terminal transition.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{StopController, Supervisor};
use crate::error::{SupervisorError, SupervisorResult};
use crate::launcher::ScratchDir;
use crate::registry::{LiveHandle, Outcome, Registry};
use crate::relay::{spawn_line_reader, EventSink, OutputTee, Pipe, Relay, RelayEnd};
use crate::signal;
use crate::store::ProcessStore;

impl Supervisor {
    /// Attach `sink` to a run, starting its OS process.
    ///
    /// Returns the relay task. It completes once the `end` event has been
    /// delivered, or once a disconnected run has been stopped.
    ///
    /// # Errors
    ///
    /// Same as [`Supervisor::stream_output`].
    pub async fn attach<S: EventSink>(
        &self,
        process_id: Uuid,
        mut sink: S,
    ) -> SupervisorResult<JoinHandle<()>> {
        let Some(handle) = self.registry.get(process_id).await else {
            return Err(self.unattachable(process_id).await);
        };

        let mut slot = handle.lock_launch().await;
        if handle.outcome().is_some() {
            return Err(SupervisorError::NotRunning(process_id));
        }
        let Some(launch) = slot.take() else {
            return Err(SupervisorError::StreamUnavailable {
                process_id,
                reason: "a stream is already attached".to_string(),
            });
        };

        let mut started = match launch.spawn() {
            Ok(started) => started,
            Err(e) => {
                drop(slot);
                error!(%process_id, error = %e, "failed to start process");
                let outcome = finalize(
                    &self.registry,
                    self.store.as_ref(),
                    &handle,
                    Outcome::error(format!("failed to start process: {e}")),
                )
                .await;
                return Ok(tokio::spawn(async move {
                    let _ = sink.send(outcome.to_end_event()).await;
                }));
            }
        };

        if let Some(pid) = started.child.id() {
            handle.set_pid(pid);
            self.persist_pid(process_id, pid).await;
        }
        info!(%process_id, script_id = %handle.script_id, pid = ?handle.pid(), "process started");

        let (chunk_tx, chunk_rx) = mpsc::channel(self.settings.channel_capacity);
        if let Some(stdout) = started.child.stdout.take() {
            spawn_line_reader(process_id, Pipe::Stdout, stdout, chunk_tx.clone());
        }
        if let Some(stderr) = started.child.stderr.take() {
            spawn_line_reader(process_id, Pipe::Stderr, stderr, chunk_tx);
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch_exit(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&handle),
            started.child,
            started.scratch,
            exit_tx,
            self.settings.stop_grace_period,
        ));
        drop(slot);

        let tee = self.open_tee(process_id).await;
        let relay = Relay::new(process_id, sink, chunk_rx, exit_rx, self.settings.drain_timeout)
            .with_tee(tee);
        let stop = Arc::clone(&self.stop);

        Ok(tokio::spawn(async move {
            if relay.run().await == RelayEnd::Disconnected {
                disconnect(&stop, &handle).await;
            }
        }))
    }

    async fn unattachable(&self, process_id: Uuid) -> SupervisorError {
        match self.store.find_by_id(process_id).await {
            Ok(None) => SupervisorError::NotFound(process_id),
            Ok(Some(record)) if !record.is_running() => SupervisorError::NotRunning(process_id),
            Ok(Some(_)) => SupervisorError::StreamUnavailable {
                process_id,
                reason: "the run is not supervised by this instance".to_string(),
            },
            Err(e) => e.into(),
        }
    }

    async fn persist_pid(&self, process_id: Uuid, pid: u32) {
        if let Err(e) = self.store.set_pid(process_id, pid).await {
            warn!(%process_id, pid, error = %e, "failed to persist pid");
        }
    }

    async fn open_tee(&self, process_id: Uuid) -> Option<OutputTee> {
        let dir = self.settings.output_dir.as_ref()?;
        let path: PathBuf = dir.join(format!("{process_id}.log"));
        match OutputTee::open(&path).await {
            Ok(tee) => Some(tee),
            Err(e) => {
                warn!(%process_id, error = %format!("{e:#}"), "output persistence disabled");
                None
            }
        }
    }
}

async fn disconnect(stop: &StopController, handle: &LiveHandle) {
    match stop.stop_live(handle).await {
        Ok(()) => info!(process_id = %handle.process_id, "caller disconnected, run stopped"),
        Err(SupervisorError::NotRunning(_)) => {
            debug!(process_id = %handle.process_id, "caller disconnected after run ended");
        }
        Err(e) => {
            warn!(process_id = %handle.process_id, error = %e, "failed to stop disconnected run")
        }
    }
}

/// Wait for the child to exit and perform the terminal transition.
///
/// After a stop request the child gets `grace` to exit on its own before
/// its process group is killed.
async fn watch_exit(
    registry: Arc<Registry>,
    store: Arc<dyn ProcessStore>,
    handle: Arc<LiveHandle>,
    mut child: Child,
    scratch: ScratchDir,
    exit_tx: oneshot::Sender<Outcome>,
    grace: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = handle.stop_requested() => {
            tokio::select! {
                status = child.wait() => status,
                _ = tokio::time::sleep(grace) => {
                    warn!(process_id = %handle.process_id, "process ignored SIGTERM, killing");
                    hard_kill(&handle, &mut child);
                    child.wait().await
                }
            }
        }
    };

    let observed = match status {
        Ok(status) => Outcome::from_exit_status(status),
        Err(e) => Outcome::error(format!("failed to wait for process: {e}")),
    };
    let outcome = finalize(&registry, store.as_ref(), &handle, observed).await;
    drop(scratch);

    debug!(process_id = %handle.process_id, status = %outcome.status, "exit observed");
    let _ = exit_tx.send(outcome);
}

fn hard_kill(handle: &LiveHandle, child: &mut Child) {
    if let Some(pid) = handle.pid() {
        if signal::force_kill(pid).is_ok() {
            return;
        }
    }
    if let Err(e) = child.start_kill() {
        warn!(process_id = %handle.process_id, error = %e, "kill failed");
    }
}

/// Claim `outcome` for the run and perform the terminal transition.
///
/// If another party claimed first, waits for its transition to complete.
/// Either way the returned outcome is the one the store holds.
pub(crate) async fn finalize(
    registry: &Registry,
    store: &dyn ProcessStore,
    handle: &LiveHandle,
    outcome: Outcome,
) -> Outcome {
    if handle.claim(outcome) {
        settle(registry, store, handle).await;
    } else {
        handle.settled().await;
    }
    handle
        .final_outcome()
        .cloned()
        .unwrap_or_else(|| Outcome::error("terminal outcome missing"))
}

/// Complete a claimed terminal transition: registry removal strictly
/// before persistence, then wake waiters. Store failures are logged.
///
/// A record already finalized by another instance keeps its outcome; the
/// stored outcome is what waiters observe.
pub(crate) async fn settle(registry: &Registry, store: &dyn ProcessStore, handle: &LiveHandle) {
    let Some(claimed) = handle.outcome() else {
        return;
    };
    let process_id = handle.process_id;

    registry.remove(process_id).await;

    if let Err(e) = store
        .update_status(
            process_id,
            claimed.status,
            claimed.exit_code,
            claimed.error.as_deref(),
        )
        .await
    {
        error!(%process_id, error = %e, "failed to persist terminal status");
    }

    let persisted = match store.find_by_id(process_id).await {
        Ok(Some(record)) => Outcome::from_record(&record).unwrap_or_else(|| claimed.clone()),
        Ok(None) => claimed.clone(),
        Err(e) => {
            warn!(%process_id, error = %e, "failed to read back terminal status");
            claimed.clone()
        }
    };
    if persisted != *claimed {
        info!(
            %process_id,
            observed = %claimed.status,
            stored = %persisted.status,
            "run was finalized elsewhere, reporting the stored outcome"
        );
    }

    info!(
        %process_id,
        status = %persisted.status,
        exit_code = ?persisted.exit_code,
        "run finished"
    );
    handle.mark_settled(persisted);
}
