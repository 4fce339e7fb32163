//! Test fixtures: supervisor harness, scripts and helpers.

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;
use sv_core::access::InMemoryScriptCatalog;
use sv_core::store::InMemoryProcessStore;
use sv_core::Supervisor;
use sv_protocol::config_models::SupervisorConfig;
use sv_protocol::ipc::StreamEvent;
use sv_protocol::script_models::ScriptSource;
use tempfile::TempDir;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to `sv_core=debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sv_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test if `fut` does not complete within `secs` seconds.
pub async fn with_timeout<F: Future>(secs: u64, fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .unwrap_or_else(|_| panic!("timed out after {secs}s"))
}

/// A supervisor wired to in-memory collaborators.
///
/// Keep the harness alive for the whole test: it owns the scratch root.
pub struct Harness {
    pub supervisor: Supervisor,
    pub store: Arc<InMemoryProcessStore>,
    pub catalog: Arc<InMemoryScriptCatalog>,
    pub owner: Uuid,
    pub scratch: TempDir,
}

impl Harness {
    /// Register a shell script owned by `self.owner`.
    #[allow(dead_code)]
    pub async fn add_shell_script(&self, content: &str) -> Uuid {
        self.add_script("shell", content).await
    }

    #[allow(dead_code)]
    pub async fn add_script(&self, script_type: &str, content: &str) -> Uuid {
        let script = script_source(self.owner, script_type, content);
        let id = script.id;
        self.catalog.insert(script).await;
        id
    }

    /// Number of entries left under the scratch root.
    #[allow(dead_code)]
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Harness with default settings and a short stop grace period.
#[allow(dead_code)]
pub fn harness() -> Harness {
    harness_with(|_| {})
}

/// Harness with `configure` applied on top of the test defaults.
pub fn harness_with(configure: impl FnOnce(&mut SupervisorConfig)) -> Harness {
    init_tracing();
    let scratch = tempfile::tempdir().expect("scratch root");

    let mut config = SupervisorConfig {
        scratch_root: Some(scratch.path().to_path_buf()),
        stop_grace_period_ms: 500,
        drain_timeout_ms: 1000,
        ..SupervisorConfig::default()
    };
    configure(&mut config);

    let store = Arc::new(InMemoryProcessStore::new());
    let catalog = Arc::new(InMemoryScriptCatalog::new());
    let supervisor = Supervisor::new(&config, store.clone(), catalog.clone());

    Harness {
        supervisor,
        store,
        catalog,
        owner: Uuid::new_v4(),
        scratch,
    }
}

pub fn script_source(owner_id: Uuid, script_type: &str, content: &str) -> ScriptSource {
    ScriptSource {
        id: Uuid::new_v4(),
        owner_id,
        name: format!("test-{script_type}"),
        content: content.to_string(),
        script_type: script_type.to_string(),
    }
}

/// Collect a whole output stream, failing after 10 seconds.
#[allow(dead_code)]
pub async fn collect_events<S: Stream<Item = StreamEvent> + Unpin>(stream: S) -> Vec<StreamEvent> {
    with_timeout(10, stream.collect::<Vec<_>>()).await
}

/// Poll `condition` every 20ms until it holds, failing after 5 seconds.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    with_timeout(5, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}
