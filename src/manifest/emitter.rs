use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

use crate::domain::{error::DomainError, models::PersistedManifest};

/// Writes one `{name}.json` per registered function. The first write of a
/// process run clears the directory so manifests from prior runs cannot
/// linger.
#[derive(Debug, Clone)]
pub struct ManifestEmitter {
    dir: PathBuf,
}

impl ManifestEmitter {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one manifest. `registry_len` is the registry size after the
    /// registration that produced it; a transition to 1 marks the first
    /// write of this run and triggers the directory reset.
    pub fn emit(
        &self,
        manifest: &PersistedManifest,
        registry_len: usize,
    ) -> Result<PathBuf, DomainError> {
        validate_file_name(&manifest.name)?;

        if registry_len == 1 {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(format!("{}.json", manifest.name));
        let mut body = serde_json::to_string_pretty(manifest)?;
        body.push('\n');
        fs::write(&path, body)?;

        info!("wrote manifest {}", path.display());
        Ok(path)
    }
}

fn validate_file_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::InvalidRequest(
            "manifest name must not be empty".to_owned(),
        ));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(DomainError::InvalidRequest(format!(
            "manifest name must not contain path segments: {name}"
        )));
    }
    Ok(())
}
