use std::{collections::HashMap, fs, path::Path};

use tracing::{info, warn};

use crate::domain::models::PersistedManifest;

/// In-memory view of the manifest directory, built at startup and reloaded
/// once after the handler process first connects.
#[derive(Debug, Default)]
pub struct ManifestStore {
    manifests: HashMap<String, PersistedManifest>,
}

impl ManifestStore {
    /// Read every `*.json` under `dir`. A missing directory is not an error:
    /// the store starts empty until the handler process emits manifests.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                info!(
                    "manifest directory {} not readable ({error}); starting with an empty store",
                    dir.display()
                );
                return Self::default();
            }
        };

        let mut manifests = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|error| error.to_string())
                .and_then(|body| {
                    serde_json::from_str::<PersistedManifest>(&body)
                        .map_err(|error| error.to_string())
                }) {
                Ok(manifest) => {
                    manifests.insert(manifest.name.clone(), manifest);
                }
                Err(error) => {
                    warn!("skipping unreadable manifest {}: {error}", path.display());
                }
            }
        }

        info!("loaded {} manifest(s) from {}", manifests.len(), dir.display());
        Self { manifests }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PersistedManifest> {
        self.manifests.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
