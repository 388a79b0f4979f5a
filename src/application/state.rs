use std::{
    sync::Arc,
    time::Instant,
};

use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::{
    application::config::RuntimeConfig,
    bridge::InvocationBridge,
    domain::{error::DomainError, models::PersistedManifest},
    manifest::ManifestStore,
    session::{HttpSessionProvider, SessionProvider},
};

#[derive(Clone)]
pub struct SharedState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: RuntimeConfig,
    bridge: InvocationBridge,
    manifests: RwLock<ManifestStore>,
    provider: Arc<dyn SessionProvider>,
    started_at: Instant,
}

impl SharedState {
    pub fn new(config: RuntimeConfig) -> Result<Self, DomainError> {
        let provider = Arc::new(HttpSessionProvider::from_config(&config)?);
        Ok(Self::with_provider(config, provider))
    }

    #[must_use]
    pub fn with_provider(config: RuntimeConfig, provider: Arc<dyn SessionProvider>) -> Self {
        let manifests = ManifestStore::load(&config.manifests_dir);
        let bridge = InvocationBridge::new(config.invoke_timeout);

        Self {
            inner: Arc::new(InnerState {
                bridge,
                manifests: RwLock::new(manifests),
                provider,
                started_at: Instant::now(),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn bridge(&self) -> &InvocationBridge {
        &self.inner.bridge
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn SessionProvider> {
        Arc::clone(&self.inner.provider)
    }

    #[must_use]
    pub fn uptime_ms(&self) -> u64 {
        u64::try_from(self.inner.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub async fn manifest(&self, name: &str) -> Option<PersistedManifest> {
        self.inner.manifests.read().await.get(name).cloned()
    }

    pub async fn manifest_count(&self) -> usize {
        self.inner.manifests.read().await.len()
    }

    /// Re-read the manifest directory. Called once, when the handler process
    /// first connects, so manifests it just emitted become visible.
    pub async fn reload_manifests(&self) {
        let store = ManifestStore::load(&self.inner.config.manifests_dir);
        *self.inner.manifests.write().await = store;
    }

    pub async fn health_payload(&self) -> Value {
        let status = self.inner.bridge.runtime_status();
        json!({
            "ok": true,
            "uptimeMs": self.uptime_ms(),
            "functions": self.manifest_count().await,
            "runtimeConnected": status.next_held || status.in_flight,
            "inFlight": status.in_flight,
        })
    }
}
