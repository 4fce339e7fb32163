//! Stopping live and orphaned runs.

mod common;

use common::*;
use std::sync::Arc;
use sv_core::access::InMemoryScriptCatalog;
use sv_core::registry::STOP_MESSAGE;
use sv_core::store::{FileProcessStore, ProcessStore};
use sv_core::{Supervisor, SupervisorError};
use sv_protocol::config_models::SupervisorConfig;
use sv_protocol::process_models::{ProcessRecord, ProcessStatus};
use uuid::Uuid;

/// Start `content` and wait until its pid is known.
async fn start(h: &Harness, content: &str) -> (ProcessRecord, sv_core::relay::OutputStream) {
    let script_id = h.add_shell_script(content).await;
    let record = h.supervisor.run_script(h.owner, script_id, &[]).await.unwrap();
    let stream = h.supervisor.stream_output(record.id).await.unwrap();

    let store = h.store.clone();
    let id = record.id;
    wait_until(|| {
        let store = store.clone();
        async move { matches!(store.find_by_id(id).await, Ok(Some(r)) if r.pid.is_some()) }
    })
    .await;

    (record, stream)
}

#[tokio::test]
async fn test_stop_live_run() {
    let h = harness();
    let (record, stream) = start(&h, "echo started\nsleep 30\n").await;

    h.supervisor.stop_process(h.owner, record.id).await.unwrap();

    assert!(!h.supervisor.registry().contains(record.id).await);
    let stored = h.store.find_by_id(record.id).await.unwrap().unwrap();
    assert_terminal(&stored, ProcessStatus::Stopped);
    assert_eq!(stored.exit_code, Some(-1));
    assert_eq!(stored.error.as_deref(), Some(STOP_MESSAGE));

    let events = collect_events(stream).await;
    let (status, exit_code, error) = assert_single_end(&events);
    assert_eq!(status, ProcessStatus::Stopped);
    assert_eq!(exit_code, Some(-1));
    assert!(!error.is_empty());
}

#[tokio::test]
async fn test_stop_before_start_discards_launch() {
    let h = harness();
    let script_id = h.add_shell_script("echo never\n").await;
    let record = h.supervisor.run_script(h.owner, script_id, &[]).await.unwrap();
    assert_eq!(h.scratch_entries(), 1);

    h.supervisor.stop_process(h.owner, record.id).await.unwrap();

    assert_eq!(h.scratch_entries(), 0);
    let stored = h.store.find_by_id(record.id).await.unwrap().unwrap();
    assert_terminal(&stored, ProcessStatus::Stopped);
    assert!(stored.pid.is_none());
    assert!(matches!(
        h.supervisor.stream_output(record.id).await,
        Err(SupervisorError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_stop_errors() {
    let h = harness();

    let unknown = Uuid::new_v4();
    assert!(matches!(
        h.supervisor.stop_process(h.owner, unknown).await,
        Err(SupervisorError::NotFound(id)) if id == unknown
    ));

    let script_id = h.add_shell_script("sleep 30\n").await;
    let record = h.supervisor.run_script(h.owner, script_id, &[]).await.unwrap();

    let stranger = Uuid::new_v4();
    assert!(matches!(
        h.supervisor.stop_process(stranger, record.id).await,
        Err(SupervisorError::AccessDenied(_))
    ));

    h.supervisor.stop_process(h.owner, record.id).await.unwrap();
    assert!(matches!(
        h.supervisor.stop_process(h.owner, record.id).await,
        Err(SupervisorError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_script_owner_may_stop_shared_run() {
    let h = harness();
    let script_id = h.add_shell_script("sleep 30\n").await;
    let runner = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    h.catalog.share(script_id, runner).await;
    h.catalog.share(script_id, viewer).await;

    let record = h.supervisor.run_script(runner, script_id, &[]).await.unwrap();

    // Shared access is not enough to stop someone else's run.
    assert!(matches!(
        h.supervisor.stop_process(viewer, record.id).await,
        Err(SupervisorError::AccessDenied(_))
    ));
    h.supervisor.stop_process(h.owner, record.id).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigterm_ignoring_script_is_killed_after_grace() {
    let h = harness();
    let script = "trap '' TERM\necho ready\nwhile true; do sleep 0.1; done\n";
    let (record, stream) = start(&h, script).await;
    let pid = h.store.find_by_id(record.id).await.unwrap().unwrap().pid.unwrap();

    h.supervisor.stop_process(h.owner, record.id).await.unwrap();

    let events = collect_events(stream).await;
    let (status, _, _) = assert_single_end(&events);
    assert_eq!(status, ProcessStatus::Stopped);
    assert!(!sv_core::signal::is_alive(pid));
}

#[cfg(unix)]
#[tokio::test]
async fn test_orphaned_run_is_stopped_by_pid() {
    use std::os::unix::process::ExitStatusExt;

    let h = harness();
    let script_id = h.add_shell_script("sleep 30\n").await;

    let mut orphan = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let mut record = ProcessRecord::admitted(script_id, h.owner);
    record.pid = Some(orphan.id());
    h.store.create(&record).await.unwrap();

    h.supervisor.stop_process(h.owner, record.id).await.unwrap();

    let status = orphan.wait().unwrap();
    assert_eq!(status.signal(), Some(15));

    let stored = h.store.find_by_id(record.id).await.unwrap().unwrap();
    assert_terminal(&stored, ProcessStatus::Stopped);
    assert_eq!(stored.exit_code, Some(-1));
    assert_eq!(stored.error.as_deref(), Some(STOP_MESSAGE));
}

#[tokio::test]
async fn test_finished_orphan_is_not_running() {
    let h = harness();
    let mut record = ProcessRecord::admitted(Uuid::new_v4(), h.owner);
    record.terminate(ProcessStatus::Success, Some(0), None);
    h.store.create(&record).await.unwrap();

    assert!(matches!(
        h.supervisor.stop_process(h.owner, record.id).await,
        Err(SupervisorError::NotRunning(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_of_previous_instance_is_stopped_through_file_store() {
    init_tracing();
    let state = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let owner = Uuid::new_v4();
    let config = SupervisorConfig {
        scratch_root: Some(scratch.path().to_path_buf()),
        ..SupervisorConfig::default()
    };

    let catalog = Arc::new(InMemoryScriptCatalog::new());
    let script = script_source(owner, "shell", "sleep 30\n");
    let script_id = script.id;
    catalog.insert(script).await;

    let first_store = Arc::new(FileProcessStore::open(state.path()).await.unwrap());
    let first = Supervisor::new(&config, first_store.clone(), catalog.clone());
    let record = first.run_script(owner, script_id, &[]).await.unwrap();
    let stream = first.stream_output(record.id).await.unwrap();
    wait_until(|| {
        let store = first_store.clone();
        async move { matches!(store.find_by_id(record.id).await, Ok(Some(r)) if r.pid.is_some()) }
    })
    .await;

    let second_store = Arc::new(FileProcessStore::open(state.path()).await.unwrap());
    let second = Supervisor::new(&config, second_store.clone(), catalog.clone());
    second.stop_process(owner, record.id).await.unwrap();

    // The first instance observes a signal death, but both the stored record
    // and its end event keep the stop recorded by the second instance.
    let events = collect_events(stream).await;
    let (status, exit_code, error) = assert_single_end(&events);
    assert_eq!(status, ProcessStatus::Stopped);
    assert_eq!(exit_code, Some(-1));
    assert_eq!(error, STOP_MESSAGE);

    let stored = second_store.find_by_id(record.id).await.unwrap().unwrap();
    assert_terminal(&stored, ProcessStatus::Stopped);
    assert_eq!(stored.error.as_deref(), Some(STOP_MESSAGE));
    assert_eq!(first_store.find_by_id(record.id).await.unwrap(), Some(stored));
}
