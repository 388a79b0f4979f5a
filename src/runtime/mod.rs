mod poll;
mod report;

pub use poll::poll_once;

use std::path::Path;

use tracing::info;

use crate::{
    application::config::{DEFAULT_MANIFESTS_DIR, Phase, PhaseSelector},
    domain::{error::DomainError, models::{FunctionConfig, PersistedManifest}},
    manifest::ManifestEmitter,
    registry::{FunctionRegistry, HandlerFn},
};

/// Handler-process entrypoint. Registrations go into the owned registry; in
/// the introspect phase each one is also persisted as a manifest, and `run`
/// returns without serving. In the runtime phase `run` installs the poll
/// loop against the bridge.
pub struct Runtime {
    selector: PhaseSelector,
    registry: FunctionRegistry,
    emitter: ManifestEmitter,
}

impl Runtime {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(PhaseSelector::from_env(), DEFAULT_MANIFESTS_DIR)
    }

    #[must_use]
    pub fn new(selector: PhaseSelector, manifests_dir: impl AsRef<Path>) -> Self {
        Self {
            selector,
            registry: FunctionRegistry::new(),
            emitter: ManifestEmitter::new(manifests_dir),
        }
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        handler: HandlerFn,
        config: FunctionConfig,
    ) -> Result<(), DomainError> {
        let name = name.into();
        let persisted = PersistedManifest {
            name: name.clone(),
            config: config.clone(),
        };
        let registry_len = self.registry.register(name, handler, config);

        if self.selector.phase == Phase::Introspect {
            self.emitter.emit(&persisted, registry_len)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn selector(&self) -> &PhaseSelector {
        &self.selector
    }

    pub async fn run(self) -> Result<(), DomainError> {
        match self.selector.phase {
            Phase::Introspect => {
                info!(
                    "introspect complete: {} manifest(s) in {}",
                    self.registry.len(),
                    self.emitter.dir().display()
                );
                Ok(())
            }
            Phase::Runtime => poll::poll_loop(&self.selector, &self.registry).await,
        }
    }
}
