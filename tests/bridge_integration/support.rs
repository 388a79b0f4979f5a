use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use funcbridge::{
    application::{config::RuntimeConfig, startup, state::SharedState},
    domain::{
        error::DomainError,
        models::{PersistedManifest, Session},
    },
    manifest::ManifestEmitter,
    session::SessionProvider,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

pub(crate) struct ServerHandle {
    pub(crate) addr: SocketAddr,
    pub(crate) provider: Arc<RecordingProvider>,
    pub(crate) manifests_dir: std::path::PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl ServerHandle {
    pub(crate) fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn invoke_url(&self, name: &str) -> String {
        format!("{}/v1/functions/{name}/invoke", self.base_url())
    }

    pub(crate) fn next_url(&self) -> String {
        format!("{}/2018-06-01/runtime/invocation/next", self.base_url())
    }

    pub(crate) fn outcome_url(&self, request_id: &str, kind: &str) -> String {
        format!(
            "{}/2018-06-01/runtime/invocation/{request_id}/{kind}",
            self.base_url()
        )
    }

    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        // A parked runtime-next request keeps graceful shutdown waiting, so
        // fall back to aborting the server task.
        if tokio::time::timeout(Duration::from_millis(500), &mut self.join)
            .await
            .is_err()
        {
            self.join.abort();
            let _ = self.join.await;
        }
    }
}

/// Session provider stub that hands out deterministic sessions and records
/// every create/release so tests can assert the lifecycle.
pub(crate) struct RecordingProvider {
    created: AtomicUsize,
    released: AtomicUsize,
    fail_create: AtomicBool,
    released_ids: Mutex<Vec<String>>,
}

impl RecordingProvider {
    fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            released_ids: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn released_ids(&self) -> Vec<String> {
        self.released_ids.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionProvider for RecordingProvider {
    async fn create(&self, _config: &Value, _api_key: Option<&str>) -> Result<Session, DomainError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(DomainError::SessionProvision(
                "stub provider refused the session".to_owned(),
            ));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Session::new(
            format!("sess-{n}"),
            format!("wss://connect.test/sess-{n}"),
        ))
    }

    async fn release(&self, id: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.released_ids
            .lock()
            .expect("lock poisoned")
            .push(id.to_owned());
    }
}

pub(crate) async fn spawn_server(manifests: &[PersistedManifest]) -> ServerHandle {
    spawn_server_with(manifests, |_: &mut RuntimeConfig| {}).await
}

pub(crate) async fn spawn_server_with(
    manifests: &[PersistedManifest],
    configure: impl FnOnce(&mut RuntimeConfig),
) -> ServerHandle {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should expose local addr");

    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let manifests_dir = temp_dir.path().join("manifests");

    let emitter = ManifestEmitter::new(&manifests_dir);
    for (index, manifest) in manifests.iter().enumerate() {
        emitter
            .emit(manifest, index + 1)
            .expect("manifest should emit");
    }

    let mut config = RuntimeConfig::for_test(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        addr.port(),
        manifests_dir.clone(),
    );
    configure(&mut config);

    let provider = Arc::new(RecordingProvider::new());
    let state = SharedState::with_provider(config, provider.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let _ = startup::run_with_state(listener, state, async {
            let _ = shutdown_rx.await;
        })
        .await;
    });

    ServerHandle {
        addr,
        provider,
        manifests_dir,
        shutdown: Some(shutdown_tx),
        join,
        _temp_dir: temp_dir,
    }
}

/// Park a long-poll GET on the next endpoint and hand back the in-flight
/// request. Returns once the server is actually holding the connection, so
/// a following invoke cannot race it.
pub(crate) async fn park_runtime(server: &ServerHandle) -> JoinHandle<reqwest::Response> {
    let url = server.next_url();
    let handle = tokio::spawn(async move {
        reqwest::get(url).await.expect("next poll should complete")
    });
    let base_url = server.base_url();
    wait_until(move || {
        let health_url = format!("{base_url}/");
        async move {
            let health: Value = reqwest::get(health_url)
                .await
                .expect("health should respond")
                .json()
                .await
                .expect("health should be json");
            health["runtimeConnected"] == true
        }
    })
    .await;
    handle
}

/// Poll a condition until it holds or two seconds elapse.
pub(crate) async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not hold within the deadline");
}
